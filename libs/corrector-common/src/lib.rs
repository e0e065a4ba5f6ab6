pub mod blocks;
pub mod types;
