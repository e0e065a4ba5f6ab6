//! Validation Rule Engine - Structural Constraints on Block Programs
//!
//! **Core Responsibility:**
//! Check must-use, max-count and whitelist rules against a block tree
//! before anything executes.
//!
//! **Evaluation Rules:**
//! - Every rule runs; none short-circuits another
//! - Violations keep rule declaration order
//! - Counting covers every top-level script, nested inputs and `next`
//!   chains; shadow blocks are editor defaults and are not counted
//! - A whitelist reports each offending type once, in first-seen order

use corrector_common::blocks::{Block, BlockProgram};
use corrector_common::types::{ValidationRule, Violation};
use std::collections::HashSet;

/// Evaluate all rules. An empty result means the program passes.
pub fn evaluate(program: &BlockProgram, rules: &[ValidationRule]) -> Vec<Violation> {
    let blocks: Vec<&Block> = program.iter().filter(|block| !block.shadow).collect();

    let mut violations = Vec::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        match rule {
            ValidationRule::MustUseBlock { block_type, .. } => {
                if !blocks.iter().any(|block| &block.block_type == block_type) {
                    violations.push(violation(
                        rule_index,
                        rule,
                        Some(block_type.clone()),
                        format!("The program must use the '{}' block", block_type),
                    ));
                }
            }
            ValidationRule::MaxBlocks { limit, .. } => {
                if blocks.len() > *limit {
                    violations.push(violation(
                        rule_index,
                        rule,
                        None,
                        format!(
                            "The program uses {} blocks; at most {} are allowed",
                            blocks.len(),
                            limit
                        ),
                    ));
                }
            }
            ValidationRule::Whitelist { allowed, .. } => {
                let mut reported = HashSet::new();
                for block in &blocks {
                    let block_type = block.block_type.as_str();
                    if !allowed.iter().any(|a| a == block_type) && reported.insert(block_type) {
                        violations.push(violation(
                            rule_index,
                            rule,
                            Some(block_type.to_string()),
                            format!("The '{}' block is not allowed in this exercise", block_type),
                        ));
                    }
                }
            }
        }
    }
    violations
}

fn violation(
    rule_index: usize,
    rule: &ValidationRule,
    block_type: Option<String>,
    default_message: String,
) -> Violation {
    Violation {
        rule_index,
        rule_id: rule.id().map(str::to_string),
        kind: rule.kind(),
        block_type,
        message: rule
            .message()
            .map(str::to_string)
            .unwrap_or(default_message),
    }
}
