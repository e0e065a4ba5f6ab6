//! Code Test Runner - Routine Grading Against Declarative Test Cases
//!
//! **Core Responsibility:**
//! Run one learner routine against an ordered list of test cases and
//! aggregate a `GradingVerdict`.
//!
//! **Failure Scoping:**
//! - Blank source, no routine name, uncompilable source, missing routine:
//!   batch-fatal, every case reports the same text
//! - Malformed descriptor, thrown error, no return value: that case only
//!
//! **Scoring Rules:**
//! - score = sum of points for passed cases
//! - max_score = sum of all points
//! - passed = at least one case and every case passed
//!
//! Synchronous and stateless: every call builds its own interpreter, so
//! independent submissions can be graded concurrently without locking.

use crate::codec;
use crate::config::RoutineLimits;
use crate::extractor::{ExtractionError, Routine, RoutineExtractor};
use corrector_common::types::{CaseResult, GradingVerdict, TestCase};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

pub const NO_CODE_MESSAGE: &str = "Error: No code provided";
pub const NO_VALUE_MESSAGE: &str = "Routine returned no value";

lazy_static! {
    static ref ROUTINE_DECLARATION: Regex =
        Regex::new(r"(?m)^[ \t]*(?:private[ \t]+)?fn[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(")
            .expect("routine declaration pattern is valid");
}

pub struct CodeTestRunner {
    limits: RoutineLimits,
}

impl CodeTestRunner {
    pub fn new(limits: RoutineLimits) -> Self {
        Self { limits }
    }

    #[instrument(skip_all, fields(cases = cases.len(), source_bytes = source.len()))]
    pub fn run(&self, source: &str, cases: &[TestCase]) -> GradingVerdict {
        if source.trim().is_empty() {
            warn!("Submission has no code");
            return fail_all(cases, NO_CODE_MESSAGE);
        }

        let name = match routine_name(source, cases) {
            Some(name) => name,
            None => return fail_all(cases, &error_text(&ExtractionError::NoRoutineName)),
        };

        let extractor = RoutineExtractor::new(&self.limits);
        let routine = match extractor.extract(source, &name) {
            Ok(routine) => routine,
            Err(e) => {
                warn!(routine = %name, error = %e, "Routine extraction failed; all cases fail");
                return fail_all(cases, &error_text(&e));
            }
        };

        let results: Vec<CaseResult> = cases
            .iter()
            .enumerate()
            .map(|(idx, case)| {
                let result = evaluate_case(&routine, case);
                debug!(
                    case = idx + 1,
                    input = %result.input,
                    passed = result.passed,
                    "Case evaluated"
                );
                result
            })
            .collect();

        let verdict = aggregate_results(results);
        info!(
            routine = %name,
            passed = verdict.passed,
            passed_count = verdict.passed_count,
            total_count = verdict.total_count,
            score = verdict.score,
            max_score = verdict.max_score,
            "Code grading complete"
        );
        verdict
    }
}

/// Evaluate a single case against an already extracted routine.
pub fn evaluate_case(routine: &Routine<'_>, case: &TestCase) -> CaseResult {
    let outcome = match codec::decode(&case.input) {
        Err(e) => Err(error_text(&e)),
        Ok(call) => match routine.invoke(&call.args) {
            Err(message) => Err(format!("Error: {}", message)),
            Ok(value) if value.is_unit() => Err(format!("Error: {}", NO_VALUE_MESSAGE)),
            Ok(value) => Ok(codec::encode_dynamic(&value)),
        },
    };
    // A failing call is a failed case even when its text equals the expectation.
    match outcome {
        Ok(actual) => {
            let passed = actual == case.expected;
            case_result(case, actual, passed)
        }
        Err(actual) => case_result(case, actual, false),
    }
}

pub fn aggregate_results(results: Vec<CaseResult>) -> GradingVerdict {
    let total_count = results.len();
    let passed_count = results.iter().filter(|r| r.passed).count();
    let score = results.iter().filter(|r| r.passed).map(|r| r.points).sum();
    let max_score = results.iter().map(|r| r.points).sum();

    GradingVerdict {
        passed: total_count > 0 && passed_count == total_count,
        per_case: results,
        passed_count,
        total_count,
        score,
        max_score,
    }
}

/// Routine name from the first case's call expression, else from the first
/// top-level `fn` declaration in the source.
fn routine_name(source: &str, cases: &[TestCase]) -> Option<String> {
    cases
        .first()
        .and_then(|case| codec::decode(&case.input).ok())
        .and_then(|call| call.routine)
        .or_else(|| declared_routine(source))
}

pub fn declared_routine(source: &str) -> Option<String> {
    ROUTINE_DECLARATION
        .captures(source)
        .map(|captures| captures[1].to_string())
}

fn error_text(err: &dyn std::error::Error) -> String {
    format!("Error: {}", err)
}

pub(crate) fn fail_all(cases: &[TestCase], actual: &str) -> GradingVerdict {
    aggregate_results(
        cases
            .iter()
            .map(|case| case_result(case, actual.to_string(), false))
            .collect(),
    )
}

fn case_result(case: &TestCase, actual: String, passed: bool) -> CaseResult {
    CaseResult {
        input: codec::describe(&case.input),
        expected: case.expected.clone(),
        actual,
        passed,
        points: case.points,
        visibility: case.visibility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrector_common::types::{CallDescriptor, LiteralValue, Visibility};

    /// Helper to create a test case from a call expression
    fn make_test_case(call: &str, expected: &str, points: u32) -> TestCase {
        TestCase {
            input: CallDescriptor::call(call),
            expected: expected.to_string(),
            points,
            visibility: Visibility::Public,
        }
    }

    fn runner() -> CodeTestRunner {
        CodeTestRunner::new(RoutineLimits::default())
    }

    #[test]
    fn test_all_pass() {
        let cases = vec![
            make_test_case("add(1, 2)", "3", 10),
            make_test_case("add(-4, 4)", "0", 15),
        ];
        let verdict = runner().run("fn add(a, b) { a + b }", &cases);

        assert!(verdict.passed);
        assert_eq!(verdict.passed_count, 2);
        assert_eq!(verdict.total_count, 2);
        assert_eq!(verdict.score, 25);
        assert_eq!(verdict.max_score, 25);
    }

    #[test]
    fn test_partial_pass() {
        let cases = vec![
            make_test_case("abs_value(-3)", "3", 20),
            make_test_case("abs_value(5)", "5", 30),
        ];
        // Wrong for positive inputs
        let verdict = runner().run("fn abs_value(x) { -x }", &cases);

        assert!(!verdict.passed);
        assert_eq!(verdict.passed_count, 1);
        assert_eq!(verdict.score, 20);
        assert_eq!(verdict.max_score, 50);
        assert!(verdict.per_case[0].passed);
        assert_eq!(verdict.per_case[1].actual, "-5");
    }

    #[test]
    fn test_empty_source() {
        let cases = vec![make_test_case("f(1)", "1", 1), make_test_case("f(2)", "2", 1)];
        for source in ["", "   \n\t"] {
            let verdict = runner().run(source, &cases);
            assert_eq!(verdict.passed_count, 0);
            assert!(verdict.per_case.iter().all(|r| r.actual == NO_CODE_MESSAGE));
        }
    }

    #[test]
    fn test_missing_routine_is_batch_fatal() {
        let cases = vec![make_test_case("total(1)", "1", 1), make_test_case("total(2)", "2", 1)];
        let verdict = runner().run("fn sum(x) { x }", &cases);

        assert!(!verdict.passed);
        for result in &verdict.per_case {
            assert_eq!(result.actual, "Error: Routine 'total' not found");
        }
    }

    #[test]
    fn test_compile_error_is_batch_fatal() {
        let cases = vec![make_test_case("f(1)", "1", 1), make_test_case("f(2)", "2", 1)];
        let verdict = runner().run("fn f(x) { x + }", &cases);

        assert_eq!(verdict.passed_count, 0);
        assert!(verdict.per_case[0].actual.starts_with("Error: Compilation failed"));
        assert_eq!(verdict.per_case[0].actual, verdict.per_case[1].actual);
    }

    #[test]
    fn test_throwing_case_does_not_abort_siblings() {
        let source = r#"fn root(x) { if x < 0 { throw "negative input"; } x.sqrt() }"#;
        let cases = vec![
            make_test_case("root(-1)", "0", 1),
            make_test_case("root(9.0)", "3", 1),
        ];
        let verdict = runner().run(source, &cases);

        assert_eq!(verdict.per_case[0].actual, "Error: negative input");
        assert!(!verdict.per_case[0].passed);
        assert!(verdict.per_case[1].passed);
    }

    #[test]
    fn test_no_return_value() {
        let cases = vec![make_test_case("double(2)", "4", 1)];
        let verdict = runner().run("fn double(x) { let y = x * 2; }", &cases);

        assert!(!verdict.passed);
        assert_eq!(verdict.per_case[0].actual, "Error: Routine returned no value");
    }

    #[test]
    fn test_infinite_loop_is_contained() {
        let limits = RoutineLimits {
            max_operations: 10_000,
            ..RoutineLimits::default()
        };
        let source = "fn spin(x) { if x > 0 { loop { } } x }";
        let cases = vec![make_test_case("spin(1)", "1", 1), make_test_case("spin(0)", "0", 1)];
        let verdict = CodeTestRunner::new(limits).run(source, &cases);

        assert!(verdict.per_case[0].actual.contains("possible infinite loop"));
        assert!(verdict.per_case[1].passed);
    }

    #[test]
    fn test_malformed_descriptor_fails_only_that_case() {
        let cases = vec![make_test_case("inc(1)", "2", 1), make_test_case("inc(1", "2", 1)];
        let verdict = runner().run("fn inc(x) { x + 1 }", &cases);

        assert!(verdict.per_case[0].passed);
        assert!(verdict.per_case[1]
            .actual
            .starts_with("Error: Malformed call expression"));
    }

    #[test]
    fn test_positional_arguments_use_declared_routine() {
        let cases = vec![TestCase {
            input: CallDescriptor::args(vec![LiteralValue::Integer(2), LiteralValue::Integer(5)]),
            expected: "10".to_string(),
            points: 1,
            visibility: Visibility::Hidden,
        }];
        let verdict = runner().run("// product\nfn product(a, b) { a * b }", &cases);

        assert!(verdict.passed);
        assert_eq!(verdict.per_case[0].input, "(2, 5)");
        assert_eq!(verdict.per_case[0].visibility, Visibility::Hidden);
    }

    #[test]
    fn test_no_routine_name() {
        let cases = vec![TestCase {
            input: CallDescriptor::args(vec![LiteralValue::Integer(1)]),
            expected: "1".to_string(),
            points: 1,
            visibility: Visibility::Public,
        }];
        let verdict = runner().run("let x = 1;", &cases);

        assert_eq!(
            verdict.per_case[0].actual,
            "Error: No routine name could be determined from the test cases or the source"
        );
    }

    #[test]
    fn test_canonical_float_and_string_results() {
        let source = r#"
            fn half(x) { x / 2.0 }
            fn greet(name) { "Hello, " + name }
        "#;
        let verdict = runner().run(
            source,
            &[make_test_case("half(3)", "1.5", 1), make_test_case("half(4)", "2", 1)],
        );
        assert!(verdict.passed);

        let verdict = runner().run(source, &[make_test_case(r#"greet("Ada")"#, "Hello, Ada", 1)]);
        assert!(verdict.passed);
    }

    #[test]
    fn test_no_numeric_tolerance() {
        let verdict = runner().run("fn third() { 1.0 / 3.0 }", &[make_test_case("third()", "0.333", 1)]);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_no_cases_is_not_a_pass() {
        let verdict = runner().run("fn f(x) { x }", &[]);
        assert!(!verdict.passed);
        assert_eq!(verdict.total_count, 0);
    }

    #[test]
    fn test_declared_routine_scan() {
        assert_eq!(
            declared_routine("let a = 1;\n  fn helper_2 (x) { x }\nfn main() {}"),
            Some("helper_2".to_string())
        );
        assert_eq!(declared_routine("let f = |x| x;"), None);
    }
}
