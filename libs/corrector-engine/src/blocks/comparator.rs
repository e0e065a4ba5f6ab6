//! Structural Comparator - Block Program Equivalence
//!
//! **Core Responsibility:**
//! Decide whether a learner's canvas contains the reference script.
//!
//! **Two Passes:**
//! 1. `normalize`: pure, strips ids, coordinates, presentation attributes and
//!    the shadow flag, trims field text, drops empty input slots
//! 2. compare normalized trees with ordered equality: type, mutation,
//!    remaining attributes, fields, input slots and the `next` chain
//!
//! Sequences are order-sensitive: reordering instructions changes meaning.

use corrector_common::blocks::{Block, BlockProgram, InputKind};
use std::collections::BTreeMap;
use tracing::warn;

/// Attributes that only describe how a block is displayed in the editor.
pub const PRESENTATION_ATTRIBUTES: &[&str] = &[
    "id",
    "x",
    "y",
    "collapsed",
    "inline",
    "deletable",
    "movable",
    "editable",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBlock {
    pub block_type: String,
    pub attributes: BTreeMap<String, String>,
    pub mutation: BTreeMap<String, String>,
    pub fields: Vec<(String, String)>,
    pub inputs: Vec<(String, InputKind, NormalizedBlock)>,
    pub next: Option<Box<NormalizedBlock>>,
}

pub fn normalize(block: &Block) -> NormalizedBlock {
    NormalizedBlock {
        block_type: block.block_type.clone(),
        attributes: block
            .attributes
            .iter()
            .filter(|(name, _)| !PRESENTATION_ATTRIBUTES.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        mutation: block.mutation.clone(),
        fields: block
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.value.trim().to_string()))
            .collect(),
        inputs: block
            .inputs
            .iter()
            .filter_map(|input| {
                input
                    .block
                    .as_deref()
                    .map(|child| (input.name.clone(), input.kind, normalize(child)))
            })
            .collect(),
        next: block.next.as_deref().map(|next| Box::new(normalize(next))),
    }
}

/// True when at least one top-level script of `candidate` matches the
/// reference's graded root. Stray scripts on the canvas are ignored.
pub fn equivalent(candidate: &BlockProgram, reference: &BlockProgram) -> bool {
    let Some(root) = reference.blocks.first() else {
        return candidate.is_empty();
    };
    if reference.blocks.len() > 1 {
        warn!(
            scripts = reference.blocks.len(),
            "Reference program has several top-level scripts; grading against the first"
        );
    }

    let expected = normalize(root);
    candidate
        .blocks
        .iter()
        .any(|script| normalize(script) == expected)
}
