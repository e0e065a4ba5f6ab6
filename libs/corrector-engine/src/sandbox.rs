//! Block Program Sandbox - Isolated, Deadline-Bounded Execution
//!
//! **Core Responsibility:**
//! Run one compiled block program in its own execution context, stream its
//! output back in order, and stop it when the deadline passes.
//!
//! **Execution Flow:**
//! 1. Spawn a dedicated OS thread with a fresh interpreter
//! 2. `print` output travels over a bounded channel as `Log` lines
//! 3. Race the channel against the deadline; the deadline wins ties
//! 4. Whatever wins, raise the kill flag so the losing context stops
//!
//! The host never joins the execution thread. A runaway program notices the
//! kill flag through the interpreter's progress hook and unwinds on its own.

use crate::blocks::compiler::CompiledProgram;
use crate::config::SandboxLimits;
use crate::interpreter::{guarded, sandbox_engine};
use corrector_common::types::{ExecutionLog, RunOutcome};
use rhai::Dynamic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub const TIME_LIMIT_MESSAGE: &str = "Temps d'exécution dépassé";
pub const OUTPUT_LIMIT_MESSAGE: &str = "Output truncated: line limit reached";
const CONTEXT_LOST_MESSAGE: &str = "Execution context stopped without reporting a result";

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRun {
    pub outcome: RunOutcome,
    pub log: ExecutionLog,
    pub elapsed_ms: u64,
}

enum SandboxMessage {
    Line(String),
    Truncated,
    Finished(Result<(), String>),
}

enum Terminal {
    Finished(Result<(), String>),
    Lost,
}

/// Raises the kill flag when dropped, so the execution thread is told to
/// stop even if the awaiting future is cancelled.
struct ContextGuard {
    terminate: Arc<AtomicBool>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::SeqCst);
    }
}

pub struct BlockProgramSandbox {
    limits: SandboxLimits,
}

impl BlockProgramSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn run(&self, program: &CompiledProgram, timeout: Duration) -> SandboxRun {
        let start = Instant::now();
        let mut log = ExecutionLog::new();

        let (tx, mut rx) = mpsc::channel(self.limits.log_channel_capacity.max(1));
        let guard = ContextGuard {
            terminate: Arc::new(AtomicBool::new(false)),
        };

        let source = program.source.clone();
        let limits = self.limits.clone();
        let terminate = guard.terminate.clone();
        let spawned = thread::Builder::new()
            .name("block-sandbox".to_string())
            .spawn(move || execute(&source, &limits, tx, terminate));
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start execution context");
            log.system_error(format!("Failed to start execution context: {}", e));
            return SandboxRun {
                outcome: RunOutcome::RuntimeError,
                log,
                elapsed_ms: elapsed_ms(start),
            };
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let terminal = loop {
            tokio::select! {
                biased;

                _ = &mut deadline => break None,
                message = rx.recv() => match message {
                    Some(SandboxMessage::Line(line)) => log.log(line),
                    Some(SandboxMessage::Truncated) => {
                        warn!(max_lines = self.limits.max_log_lines, "Block program output truncated");
                        log.system_error(OUTPUT_LIMIT_MESSAGE);
                    }
                    Some(SandboxMessage::Finished(result)) => break Some(Terminal::Finished(result)),
                    None => break Some(Terminal::Lost),
                },
            }
        };

        // Stop the context whatever the outcome, then release the channel so
        // a sender blocked on a full buffer wakes up and exits.
        drop(guard);
        drop(rx);

        let elapsed = start.elapsed();
        let outcome = match terminal {
            Some(_) if elapsed >= timeout => {
                log.system_error(TIME_LIMIT_MESSAGE);
                RunOutcome::TimedOut
            }
            None => {
                log.system_error(TIME_LIMIT_MESSAGE);
                RunOutcome::TimedOut
            }
            Some(Terminal::Finished(Ok(()))) => RunOutcome::Completed,
            Some(Terminal::Finished(Err(message))) => {
                log.error(message);
                RunOutcome::RuntimeError
            }
            Some(Terminal::Lost) => {
                log.system_error(CONTEXT_LOST_MESSAGE);
                RunOutcome::RuntimeError
            }
        };

        match outcome {
            RunOutcome::Completed => info!(lines = log.len(), "Block program completed"),
            RunOutcome::TimedOut => warn!("Block program exceeded its time limit"),
            RunOutcome::RuntimeError => warn!("Block program failed at runtime"),
        }

        SandboxRun {
            outcome,
            log,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Body of the execution thread.
fn execute(
    source: &str,
    limits: &SandboxLimits,
    tx: mpsc::Sender<SandboxMessage>,
    terminate: Arc<AtomicBool>,
) {
    let mut engine = sandbox_engine(limits);

    // Lines past the limit are dropped; the program keeps running until it
    // finishes or the kill flag is raised.
    let lines = AtomicUsize::new(0);
    let max_lines = limits.max_log_lines;
    let print_tx = tx.clone();
    engine.on_print(move |text| {
        let seen = lines.fetch_add(1, Ordering::SeqCst);
        // A closed channel means the host has already settled the run.
        if seen < max_lines {
            let _ = print_tx.blocking_send(SandboxMessage::Line(text.to_string()));
        } else if seen == max_lines {
            let _ = print_tx.blocking_send(SandboxMessage::Truncated);
        }
    });

    engine.on_progress(move |_| {
        if terminate.load(Ordering::SeqCst) {
            Some(Dynamic::from("terminated".to_string()))
        } else {
            None
        }
    });

    let result = guarded(|| engine.run(source));
    let _ = tx.blocking_send(SandboxMessage::Finished(result));
}
