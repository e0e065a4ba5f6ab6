use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blocks::BlockProgram;

/// Literal value used for test-case arguments.
///
/// Integers and floats are kept apart so that integer arithmetic inside a
/// learner's routine stays exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<LiteralValue>),
}

/// How one test case calls the routine.
///
/// Accepts three JSON shapes: a call expression string (`"sum(2, 3)"`), a
/// positional argument array (`[2, 3]`), or an object with `call` and/or
/// `args`. Exactly one representation must be present; the codec rejects
/// anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCallDescriptor", into = "RawCallDescriptor")]
pub struct CallDescriptor {
    pub call: Option<String>,
    pub args: Option<Vec<LiteralValue>>,
}

impl CallDescriptor {
    pub fn call(expression: impl Into<String>) -> Self {
        Self {
            call: Some(expression.into()),
            args: None,
        }
    }

    pub fn args(args: Vec<LiteralValue>) -> Self {
        Self {
            call: None,
            args: Some(args),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCallDescriptor {
    Call(String),
    Args(Vec<LiteralValue>),
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<LiteralValue>>,
    },
}

impl From<RawCallDescriptor> for CallDescriptor {
    fn from(raw: RawCallDescriptor) -> Self {
        match raw {
            RawCallDescriptor::Call(call) => CallDescriptor::call(call),
            RawCallDescriptor::Args(args) => CallDescriptor::args(args),
            RawCallDescriptor::Object { call, args } => CallDescriptor { call, args },
        }
    }
}

impl From<CallDescriptor> for RawCallDescriptor {
    fn from(descriptor: CallDescriptor) -> Self {
        match (descriptor.call, descriptor.args) {
            (Some(call), None) => RawCallDescriptor::Call(call),
            (None, Some(args)) => RawCallDescriptor::Args(args),
            (call, args) => RawCallDescriptor::Object { call, args },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Hidden,
}

fn default_points() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: CallDescriptor,
    pub expected: String,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub visibility: Visibility,
}

/// Outcome of a single test case. `actual` is always text, even for errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub points: u32,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingVerdict {
    pub passed: bool,
    pub per_case: Vec<CaseResult>,
    pub passed_count: usize,
    pub total_count: usize,
    pub score: u32,
    pub max_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Log,
    Error,
    SystemError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}

/// Append-only record of one sandboxed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        self.entries.push(LogEntry {
            kind,
            text: text.into(),
        });
    }

    pub fn log(&mut self, text: impl Into<String>) {
        self.push(LogKind::Log, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogKind::Error, text);
    }

    pub fn system_error(&mut self, text: impl Into<String>) {
        self.push(LogKind::SystemError, text);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Text of the `Log` entries only, in emission order.
    pub fn output_lines(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == LogKind::Log)
            .map(|entry| entry.text.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Terminal outcome class of a sandboxed run. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    RuntimeError,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    MustUseBlock,
    MaxBlocks,
    Whitelist,
}

/// Structural constraint checked against a block program before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    MustUseBlock {
        #[serde(default)]
        id: Option<String>,
        block_type: String,
        #[serde(default)]
        message: Option<String>,
    },
    MaxBlocks {
        #[serde(default)]
        id: Option<String>,
        limit: usize,
        #[serde(default)]
        message: Option<String>,
    },
    Whitelist {
        #[serde(default)]
        id: Option<String>,
        allowed: Vec<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ValidationRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            ValidationRule::MustUseBlock { .. } => RuleKind::MustUseBlock,
            ValidationRule::MaxBlocks { .. } => RuleKind::MaxBlocks,
            ValidationRule::Whitelist { .. } => RuleKind::Whitelist,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ValidationRule::MustUseBlock { id, .. }
            | ValidationRule::MaxBlocks { id, .. }
            | ValidationRule::Whitelist { id, .. } => id.as_deref(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ValidationRule::MustUseBlock { message, .. }
            | ValidationRule::MaxBlocks { message, .. }
            | ValidationRule::Whitelist { message, .. } => message.as_deref(),
        }
    }
}

/// A failed structural rule. Plain data, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Code,
    Block,
}

/// What an exercise expects, handed in by the submission handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub kind: ExerciseKind,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    pub reference_program: Option<BlockProgram>,
    #[serde(default)]
    pub expected_output: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default)]
    pub program_tree: Option<BlockProgram>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockVerdict {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub log: ExecutionLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_matched: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_matched: Option<bool>,
}

impl BlockVerdict {
    /// Verdict for a submission that was rejected before execution.
    pub fn rejected(violations: Vec<Violation>, log: ExecutionLog) -> Self {
        Self {
            passed: false,
            violations,
            log,
            outcome: None,
            structure_matched: None,
            output_matched: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradingOutcome {
    Code(GradingVerdict),
    Block(BlockVerdict),
}

impl GradingOutcome {
    pub fn passed(&self) -> bool {
        match self {
            GradingOutcome::Code(verdict) => verdict.passed,
            GradingOutcome::Block(verdict) => verdict.passed,
        }
    }
}

/// One grading request. The id only correlates log lines; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRequest {
    pub id: Uuid,
    pub exercise: Exercise,
    pub submission: Submission,
}

impl GradingRequest {
    pub fn new(exercise: Exercise, submission: Submission) -> Self {
        Self {
            id: Uuid::new_v4(),
            exercise,
            submission,
        }
    }
}
