//! Grader - High-Level Orchestration
//!
//! **Responsibility:**
//! Route one submission to the code path or the block path and return the
//! verdict the submission handler stores.
//!
//! **Architecture:**
//! 1. Code exercises: CodeTestRunner on the blocking pool (runner.rs)
//! 2. Block exercises: validation, compile, sandbox, compare (blocks/mod.rs)
//!
//! This module is the glue layer - it knows nothing about:
//! - How routines are resolved or invoked (extractor's job)
//! - How block programs execute (sandbox's job)
//!
//! No fault escapes `grade`: every failure is data inside the outcome.

use crate::blocks::grade_blocks;
use crate::config::GraderConfig;
use crate::runner::{self, CodeTestRunner};
use corrector_common::types::{
    BlockVerdict, Exercise, ExerciseKind, ExecutionLog, GradingOutcome, GradingRequest,
    GradingVerdict, RunOutcome, Submission,
};
use tracing::{error, info, instrument, warn};

pub const NO_PROGRAM_MESSAGE: &str = "Error: No program provided";
pub const RUNNER_FAILED_MESSAGE: &str = "Error: Grading stopped unexpectedly";

/// Grade a submission under a fresh request id.
pub async fn grade(exercise: &Exercise, submission: &Submission, config: &GraderConfig) -> GradingOutcome {
    let request = GradingRequest::new(exercise.clone(), submission.clone());
    grade_request(&request, config).await
}

#[instrument(skip_all, fields(request_id = %request.id, kind = ?request.exercise.kind))]
pub async fn grade_request(request: &GradingRequest, config: &GraderConfig) -> GradingOutcome {
    let exercise = &request.exercise;
    let submission = &request.submission;

    let outcome = match exercise.kind {
        ExerciseKind::Code => GradingOutcome::Code(grade_code(exercise, submission, config).await),
        ExerciseKind::Block => match &submission.program_tree {
            Some(program) => {
                let verdict = grade_blocks(exercise, program, config).await;
                debug_assert!(!verdict.passed || verdict.outcome == Some(RunOutcome::Completed));
                GradingOutcome::Block(verdict)
            }
            None => {
                warn!("Block exercise submitted without a program");
                let mut log = ExecutionLog::new();
                log.error(NO_PROGRAM_MESSAGE);
                GradingOutcome::Block(BlockVerdict::rejected(Vec::new(), log))
            }
        },
    };

    info!(passed = outcome.passed(), "Grading finished");
    outcome
}

/// Routine evaluation is CPU-bound, so it runs on the blocking pool and
/// leaves the async workers free for other submissions.
async fn grade_code(exercise: &Exercise, submission: &Submission, config: &GraderConfig) -> GradingVerdict {
    let source = submission.source_text.clone().unwrap_or_default();
    let cases = exercise.test_cases.clone();
    let runner = CodeTestRunner::new(config.routine.clone());

    match tokio::task::spawn_blocking(move || runner.run(&source, &cases)).await {
        Ok(verdict) => verdict,
        Err(e) => {
            error!(error = %e, "Code grading task failed");
            runner::fail_all(&exercise.test_cases, RUNNER_FAILED_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrector_common::types::{CallDescriptor, LogKind, TestCase, Visibility};

    fn code_exercise(cases: Vec<TestCase>) -> Exercise {
        Exercise {
            kind: ExerciseKind::Code,
            test_cases: cases,
            validation_rules: Vec::new(),
            reference_program: None,
            expected_output: None,
        }
    }

    fn make_test_case(call: &str, expected: &str) -> TestCase {
        TestCase {
            input: CallDescriptor::call(call),
            expected: expected.to_string(),
            points: 1,
            visibility: Visibility::Public,
        }
    }

    #[tokio::test]
    async fn test_code_exercise_routes_to_runner() {
        let exercise = code_exercise(vec![make_test_case("double(4)", "8")]);
        let submission = Submission {
            source_text: Some("fn double(x) { x * 2 }".to_string()),
            program_tree: None,
        };

        let outcome = grade(&exercise, &submission, &GraderConfig::default()).await;
        match outcome {
            GradingOutcome::Code(verdict) => {
                assert!(verdict.passed);
                assert_eq!(verdict.passed_count, 1);
            }
            other => panic!("expected a code verdict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_code_grading_yields_to_other_tasks() {
        let exercise = code_exercise(vec![make_test_case("slow_sum(100000)", "4999950000")]);
        let submission = Submission {
            source_text: Some(
                "fn slow_sum(n) { let s = 0; for i in 0..n { s += i; } s }".to_string(),
            ),
            program_tree: None,
        };
        let config = GraderConfig::default();

        let grading = grade(&exercise, &submission, &config);
        tokio::pin!(grading);
        let other_task_ran = tokio::select! {
            biased;

            _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => true,
            _ = &mut grading => false,
        };
        assert!(other_task_ran);

        match grading.await {
            GradingOutcome::Code(verdict) => assert!(verdict.passed),
            other => panic!("expected a code verdict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_source_is_blank() {
        let exercise = code_exercise(vec![make_test_case("double(4)", "8")]);
        let outcome = grade(&exercise, &Submission::default(), &GraderConfig::default()).await;
        match outcome {
            GradingOutcome::Code(verdict) => {
                assert!(!verdict.passed);
                assert_eq!(verdict.per_case[0].actual, "Error: No code provided");
            }
            other => panic!("expected a code verdict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_block_exercise_without_program() {
        let exercise = Exercise {
            kind: ExerciseKind::Block,
            ..code_exercise(Vec::new())
        };
        let outcome = grade(&exercise, &Submission::default(), &GraderConfig::default()).await;
        match outcome {
            GradingOutcome::Block(verdict) => {
                assert!(!verdict.passed);
                assert_eq!(verdict.log.entries()[0].kind, LogKind::Error);
                assert_eq!(verdict.log.entries()[0].text, NO_PROGRAM_MESSAGE);
            }
            other => panic!("expected a block verdict, got {:?}", other),
        }
    }
}
