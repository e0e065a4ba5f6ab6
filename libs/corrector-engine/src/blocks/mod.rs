// Block-program grading: validation, compilation, sandboxed run, comparison
pub mod comparator;
pub mod compiler;
pub mod validation;
pub mod xml;

use crate::config::GraderConfig;
use crate::sandbox::BlockProgramSandbox;
use corrector_common::blocks::BlockProgram;
use corrector_common::types::{BlockVerdict, ExecutionLog, Exercise, RunOutcome};
use tracing::{debug, info, instrument, warn};

/// Grade one block program.
///
/// Validation runs first and a violating program never executes. A passing
/// verdict needs a `Completed` run and every configured check (reference
/// structure, expected output) to match.
#[instrument(skip_all, fields(rules = exercise.validation_rules.len()))]
pub async fn grade_blocks(
    exercise: &Exercise,
    program: &BlockProgram,
    config: &GraderConfig,
) -> BlockVerdict {
    let violations = validation::evaluate(program, &exercise.validation_rules);
    if !violations.is_empty() {
        info!(violations = violations.len(), "Block program rejected by validation rules");
        return BlockVerdict::rejected(violations, ExecutionLog::new());
    }

    let compiled = match compiler::compile(program) {
        Ok(compiled) => compiled,
        Err(e) => {
            warn!(error = %e, "Block program could not be compiled");
            let mut log = ExecutionLog::new();
            log.error(format!("Error: {}", e));
            return BlockVerdict::rejected(Vec::new(), log);
        }
    };
    debug!(source = %compiled.source, "Compiled block program");

    let sandbox = BlockProgramSandbox::new(config.sandbox.clone());
    let run = sandbox.run(&compiled, config.sandbox.timeout()).await;

    let structure_matched = exercise
        .reference_program
        .as_ref()
        .map(|reference| comparator::equivalent(program, reference));
    let output_matched = exercise.expected_output.as_ref().map(|expected| {
        let actual = run.log.output_lines();
        actual.len() == expected.len() && actual.iter().zip(expected).all(|(a, e)| *a == e.as_str())
    });

    let passed = run.outcome == RunOutcome::Completed
        && structure_matched != Some(false)
        && output_matched != Some(false);

    info!(
        passed,
        outcome = ?run.outcome,
        elapsed_ms = run.elapsed_ms,
        ?structure_matched,
        ?output_matched,
        "Block program graded"
    );

    BlockVerdict {
        passed,
        violations: Vec::new(),
        log: run.log,
        outcome: Some(run.outcome),
        structure_matched,
        output_matched,
    }
}
