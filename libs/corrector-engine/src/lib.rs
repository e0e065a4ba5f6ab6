pub mod blocks;
pub mod codec;
pub mod config;
pub mod extractor;
pub mod grader;
pub mod runner;
pub mod sandbox;

mod interpreter;


pub use config::GraderConfig;
pub use grader::{grade, grade_request};
