// Embedded interpreter setup shared by the routine extractor and the block sandbox
use crate::codec;
use crate::config::{RoutineLimits, SandboxLimits};
use rhai::{Dynamic, Engine, EvalAltResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Fresh interpreter for one code-path grading run.
pub(crate) fn routine_engine(limits: &RoutineLimits) -> Engine {
    let mut engine = Engine::new();
    engine
        .set_max_operations(limits.max_operations)
        .set_max_call_levels(limits.max_call_levels)
        .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_array_size);
    engine.disable_symbol("eval");

    // Routines are graded on their return value; printed text is only traced.
    engine.on_print(|text| debug!(output = text, "Routine printed"));
    engine.on_debug(|text, _, _| debug!(output = text, "Routine debug output"));
    engine
}

/// Fresh interpreter for one sandboxed block-program run. Output and
/// termination hooks are installed by the sandbox itself.
pub(crate) fn sandbox_engine(limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();
    engine
        .set_max_call_levels(limits.max_call_levels)
        .set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth)
        .set_max_string_size(limits.max_string_size)
        .set_max_array_size(limits.max_array_size)
        .set_max_map_size(limits.max_array_size);
    engine.disable_symbol("eval");
    engine.register_fn("to_text", |value: Dynamic| codec::encode_dynamic(&value));
    engine
}

/// Learner-facing text for an interpreter error.
pub(crate) fn describe_error(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => describe_error(inner),
        EvalAltResult::ErrorRuntime(value, _) | EvalAltResult::ErrorTerminated(value, _) => {
            let text = codec::encode_dynamic(value);
            if text.is_empty() {
                "Runtime error".to_string()
            } else {
                text
            }
        }
        EvalAltResult::ErrorTooManyOperations(_) => {
            "Execution budget exhausted (possible infinite loop)".to_string()
        }
        EvalAltResult::ErrorStackOverflow(_) => {
            "Too many nested calls (possible infinite recursion)".to_string()
        }
        other => other.to_string(),
    }
}

/// Run interpreter work, turning both script errors and host panics into text.
pub(crate) fn guarded<T>(work: impl FnOnce() -> Result<T, Box<EvalAltResult>>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(describe_error(&err)),
        Err(payload) => Err(panic_message(payload)),
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Internal interpreter failure: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Internal interpreter failure: {}", message)
    } else {
        "Internal interpreter failure".to_string()
    }
}
