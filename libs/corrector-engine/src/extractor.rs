//! Routine Extractor - Compile Submitted Source and Resolve a Callable
//!
//! **Core Responsibility:**
//! Compile learner source in a throwaway unit and hand back the routine the
//! test cases call, or a typed reason why that is impossible.
//!
//! **Resolution Order:**
//! 1. A script function `fn name(...)` anywhere in the unit. Script functions
//!    are visible unit-wide, so declaration order never matters.
//! 2. Otherwise the unit's top-level statements run (under the operation
//!    budget) and a variable `name` holding a function pointer or closure is
//!    used, e.g. `let double = |x| x * 2;`.
//!
//! Both failure modes are batch-fatal: without a callable no test case can
//! produce information.

use crate::codec;
use crate::config::RoutineLimits;
use crate::interpreter::{guarded, routine_engine};
use corrector_common::types::LiteralValue;
use rhai::{CallFnOptions, Dynamic, Engine, FnPtr, Scope, AST};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("No routine name could be determined from the test cases or the source")]
    NoRoutineName,
    #[error("Compilation failed: {0}")]
    CompileFailed(String),
    #[error("Routine '{0}' not found")]
    NotFound(String),
}

pub struct RoutineExtractor {
    engine: Engine,
    limits: RoutineLimits,
}

enum Target {
    Declared,
    Pointer(FnPtr),
}

/// A resolved learner routine, bound to the unit it was compiled from.
pub struct Routine<'a> {
    engine: &'a Engine,
    ast: AST,
    name: String,
    target: Target,
}

impl RoutineExtractor {
    /// Each extractor owns its own interpreter; nothing is shared between runs.
    pub fn new(limits: &RoutineLimits) -> Self {
        Self {
            engine: routine_engine(limits),
            limits: limits.clone(),
        }
    }

    pub fn extract(&self, source: &str, name: &str) -> Result<Routine<'_>, ExtractionError> {
        if source.len() > self.limits.max_source_bytes {
            return Err(ExtractionError::CompileFailed(format!(
                "source exceeds the maximum size of {} bytes",
                self.limits.max_source_bytes
            )));
        }

        let ast = self
            .engine
            .compile(source)
            .map_err(|e| ExtractionError::CompileFailed(e.to_string()))?;

        if ast.iter_functions().any(|f| f.name == name) {
            debug!(routine = name, "Resolved declared routine");
            return Ok(Routine {
                engine: &self.engine,
                ast,
                name: name.to_string(),
                target: Target::Declared,
            });
        }

        let mut scope = Scope::new();
        guarded(|| self.engine.run_ast_with_scope(&mut scope, &ast))
            .map_err(ExtractionError::CompileFailed)?;

        match scope.get_value::<FnPtr>(name) {
            Some(pointer) => {
                debug!(routine = name, "Resolved routine bound to a function pointer");
                Ok(Routine {
                    engine: &self.engine,
                    ast,
                    name: name.to_string(),
                    target: Target::Pointer(pointer),
                })
            }
            None => Err(ExtractionError::NotFound(name.to_string())),
        }
    }
}

impl Routine<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the routine. Script errors and host panics come back as text.
    pub fn invoke(&self, args: &[LiteralValue]) -> Result<Dynamic, String> {
        let args: Vec<Dynamic> = args.iter().map(codec::to_dynamic).collect();
        match &self.target {
            Target::Declared => guarded(|| {
                let mut scope = Scope::new();
                let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
                self.engine
                    .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, &self.name, args)
            }),
            Target::Pointer(pointer) => {
                guarded(|| pointer.call::<Dynamic>(self.engine, &self.ast, args))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> RoutineExtractor {
        RoutineExtractor::new(&RoutineLimits::default())
    }

    #[test]
    fn test_extract_declared_routine() {
        let extractor = extractor();
        let routine = extractor
            .extract("fn multiply(a, b) { a * b }", "multiply")
            .unwrap();
        let result = routine
            .invoke(&[LiteralValue::Integer(2), LiteralValue::Integer(3)])
            .unwrap();
        assert_eq!(result.as_int().unwrap(), 6);
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let source = r#"
            fn square(x) { mul(x, x) }
            fn mul(a, b) { a * b }
        "#;
        let extractor = extractor();
        let routine = extractor.extract(source, "square").unwrap();
        let result = routine.invoke(&[LiteralValue::Integer(7)]).unwrap();
        assert_eq!(result.as_int().unwrap(), 49);
    }

    #[test]
    fn test_top_level_call_before_definition_is_not_run() {
        // A stray call at top level would throw if executed.
        let source = r#"
            print(double(2));
            throw "top level executed";
            fn double(x) { x * 2 }
        "#;
        let extractor = extractor();
        let routine = extractor.extract(source, "double").unwrap();
        let result = routine.invoke(&[LiteralValue::Integer(5)]).unwrap();
        assert_eq!(result.as_int().unwrap(), 10);
    }

    #[test]
    fn test_extract_closure_binding() {
        let source = "let factor = 3; let triple = |x| x * factor;";
        let extractor = extractor();
        let routine = extractor.extract(source, "triple").unwrap();
        let result = routine.invoke(&[LiteralValue::Integer(4)]).unwrap();
        assert_eq!(result.as_int().unwrap(), 12);
    }

    #[test]
    fn test_compile_failure() {
        let extractor = extractor();
        let err = extractor.extract("fn broken(a { a }", "broken").err().unwrap();
        assert!(matches!(err, ExtractionError::CompileFailed(_)));
    }

    #[test]
    fn test_not_found() {
        let extractor = extractor();
        let err = extractor.extract("fn other(a) { a }", "missing").err().unwrap();
        assert_eq!(err, ExtractionError::NotFound("missing".to_string()));
        assert_eq!(err.to_string(), "Routine 'missing' not found");
    }

    #[test]
    fn test_non_callable_binding_is_not_found() {
        let extractor = extractor();
        let err = extractor.extract("let answer = 42;", "answer").err().unwrap();
        assert_eq!(err, ExtractionError::NotFound("answer".to_string()));
    }

    #[test]
    fn test_oversized_source() {
        let limits = RoutineLimits {
            max_source_bytes: 8,
            ..RoutineLimits::default()
        };
        let extractor = RoutineExtractor::new(&limits);
        let err = extractor.extract("fn f(a) { a }", "f").err().unwrap();
        assert!(matches!(err, ExtractionError::CompileFailed(_)));
    }

    #[test]
    fn test_invoke_reports_thrown_error() {
        let extractor = extractor();
        let routine = extractor
            .extract(r#"fn check(x) { if x < 0 { throw "negative input"; } x }"#, "check")
            .unwrap();
        assert_eq!(
            routine.invoke(&[LiteralValue::Integer(-1)]).unwrap_err(),
            "negative input"
        );
        assert!(routine.invoke(&[LiteralValue::Integer(1)]).is_ok());
    }

    #[test]
    fn test_invoke_with_wrong_arity_fails() {
        let extractor = extractor();
        let routine = extractor.extract("fn add(a, b) { a + b }", "add").unwrap();
        assert!(routine.invoke(&[LiteralValue::Integer(1)]).is_err());
    }
}
