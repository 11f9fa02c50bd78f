//! # Execution Coordinator
//!
//! Runs one piece of user source in a fresh sandbox and always comes back
//! with an [`ExecutionResult`].
//!
//! ## Core Principles
//!
//! 1. **Never fails the caller**: annotation errors, script exceptions,
//!    timeouts and engine faults all become a `failure` outcome carrying
//!    the log collected so far.
//! 2. **Fresh state per call**: runtime, context, sink, signal and
//!    watchdog are created for one execution and dropped with it, so
//!    concurrent executions share nothing.
//! 3. **Two escape hatches**: a wall-clock deadline aborts the run, and the
//!    completion signal is raced against a fallback timer so a block that
//!    never signals cannot hang the coordinator.
//!
//! ## Protocol
//!
//! The annotated source is wrapped in an async block:
//!
//! ```text
//! (async () => {
//!   try {
//!     <annotated source>
//!   } catch (err) { __fault__(err); throw err; }
//!   finally { __complete__(); }
//! })()
//! ```
//!
//! The promise it returns is awaited under the deadline, then the
//! completion signal is awaited under the grace period, then the resolved
//! value is converted out of the engine.

pub mod errors;
pub mod phase;
pub mod signal;

#[cfg(test)]
mod tests;

use crate::annotator;
use crate::config::{Config, DEFAULT_TIMEOUT_MS};
use crate::sandbox::{self, inspect, DiagnosticSink, LineMapping, Sandbox, SandboxOptions, Watchdog};
use crate::snippet;
use crate::types::{ExecutionResult, ScriptValue};
use rquickjs::{async_with, CatchResultExt, CaughtError, Ctx, Promise, Type, Value};
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

pub use errors::ExecutionError;
pub use phase::{Phase, PhaseTracker};
pub use signal::{Completion, CompletionSignal};

/// Text placed before the user's first line
pub const PREAMBLE: &str = "(async () => {\n  try {\n";

/// Text placed after the user's last line
pub const EPILOGUE: &str = "\n  } catch (__scratchpad_err) {\n    __fault__(__scratchpad_err);\n    throw __scratchpad_err;\n  } finally {\n    __complete__();\n  }\n})()";

/// Number of lines [`PREAMBLE`] shifts the user's source down by
pub fn preamble_lines() -> u32 {
    PREAMBLE.matches('\n').count() as u32
}

/// Wrap annotated source in the async completion block
pub fn wrap(source: &str) -> String {
    let mut script = String::with_capacity(PREAMBLE.len() + source.len() + EPILOGUE.len());
    script.push_str(PREAMBLE);
    script.push_str(source);
    script.push_str(EPILOGUE);
    script
}

/* ===================== Options ===================== */

/// Per-call parameters of one execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub timeout_ms: u64,
    /// Defaults to `timeout_ms`
    pub completion_grace_ms: Option<u64>,
    pub strict_annotation: bool,
    pub sandbox: SandboxOptions,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            completion_grace_ms: None,
            strict_annotation: false,
            sandbox: SandboxOptions::default(),
        }
    }
}

impl ExecuteOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_ms: config.execution.timeout_ms,
            completion_grace_ms: config.execution.completion_grace_ms,
            strict_annotation: config.execution.strict_annotation,
            sandbox: SandboxOptions::from_config(config),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_completion_grace_ms(mut self, grace_ms: u64) -> Self {
        self.completion_grace_ms = Some(grace_ms);
        self
    }

    pub fn with_strict_annotation(mut self, strict: bool) -> Self {
        self.strict_annotation = strict;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxOptions) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms.unwrap_or(self.timeout_ms))
    }
}

/* ===================== Entry Points ===================== */

/// Run `source` with default options
pub async fn execute_code(source: &str) -> ExecutionResult {
    execute(source, &ExecuteOptions::default()).await
}

/// Run the selected text, or the cursor's line when nothing is selected
pub async fn execute_selection(
    source: &str,
    selection: Option<&str>,
    cursor_line: usize,
    options: &ExecuteOptions,
) -> ExecutionResult {
    match snippet::select_snippet(source, selection, cursor_line) {
        Some(code) => execute(&code, options).await,
        None => ExecutionResult::success(ScriptValue::Undefined, Vec::new()),
    }
}

/// Run `source` in a fresh sandbox
pub async fn execute(source: &str, options: &ExecuteOptions) -> ExecutionResult {
    let execution_id = Uuid::new_v4();
    let span = tracing::info_span!("execute", %execution_id);
    run(source, options).instrument(span).await
}

async fn run(source: &str, options: &ExecuteOptions) -> ExecutionResult {
    let started = Instant::now();
    let mut phase = PhaseTracker::new();

    if source.trim().is_empty() {
        phase.enter(Phase::ResultReturned);
        return ExecutionResult::success(ScriptValue::Undefined, Vec::new());
    }

    phase.enter(Phase::Annotating);
    let annotated = match annotate_source(source, options.strict_annotation) {
        Ok(annotated) => annotated,
        Err(e) => {
            phase.enter(Phase::Faulted);
            phase.enter(Phase::ResultReturned);
            return ExecutionResult::failure(e.to_string(), e.fault_kind(), Vec::new());
        }
    };

    let sink = DiagnosticSink::new(
        options.sandbox.max_log_entries,
        options.sandbox.inspect_depth,
        LineMapping::new(preamble_lines(), source),
    );
    let completion = CompletionSignal::new();
    let watchdog = Watchdog::new(options.timeout());

    let sandbox = match Sandbox::build(&options.sandbox, &sink, &completion, &watchdog).await {
        Ok(sandbox) => sandbox,
        Err(e) => {
            tracing::error!(error = %e, "failed to build sandbox");
            let e = ExecutionError::from(e);
            phase.enter(Phase::Faulted);
            phase.enter(Phase::ResultReturned);
            return ExecutionResult::failure(e.to_string(), e.fault_kind(), sink.entries());
        }
    };
    phase.enter(Phase::SandboxBuilt);

    phase.enter(Phase::Running);
    let outcome = {
        let script = wrap(&annotated);
        let run = RunParams {
            watchdog: watchdog.clone(),
            completion: completion.clone(),
            sink: sink.clone(),
            grace: options.completion_grace(),
            timeout_ms: options.timeout_ms,
            depth: options.sandbox.inspect_depth,
        };
        async_with!(sandbox.context() => |ctx| {
            run_in_context(ctx, script, run).await
        })
        .await
    };

    sandbox.shutdown().await;

    let result = match outcome {
        Ok(value) => {
            phase.enter(Phase::Completed);
            ExecutionResult::success(value, sink.entries())
        }
        Err(e) => {
            match e {
                ExecutionError::Timeout { .. } => {
                    tracing::warn!(timeout_ms = options.timeout_ms, "execution timed out");
                    phase.enter(Phase::TimedOut);
                }
                _ => phase.enter(Phase::Faulted),
            }
            ExecutionResult::failure(e.to_string(), e.fault_kind(), sink.entries())
        }
    };

    phase.enter(Phase::ResultReturned);
    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        entries = result.log.len(),
        success = result.is_success(),
        "execution finished"
    );
    result
}

fn annotate_source(source: &str, strict: bool) -> Result<String, ExecutionError> {
    match annotator::try_annotate(source) {
        Ok(annotation) => {
            tracing::debug!(tagged_calls = annotation.tagged_calls, "source annotated");
            Ok(annotation.source)
        }
        Err(e) if strict => Err(ExecutionError::Transform(e)),
        Err(e) => {
            tracing::warn!(error = %e, "annotation failed, falling back to stack line estimates");
            Ok(source.to_string())
        }
    }
}

/* ===================== Inside the Context ===================== */

/// Owned state moved into the context closure
struct RunParams {
    watchdog: Watchdog,
    completion: CompletionSignal,
    sink: DiagnosticSink,
    grace: Duration,
    timeout_ms: u64,
    depth: usize,
}

async fn run_in_context<'js>(
    ctx: Ctx<'js>,
    script: String,
    run: RunParams,
) -> Result<ScriptValue, ExecutionError> {
    let timed_out = || ExecutionError::Timeout {
        timeout_ms: run.timeout_ms,
    };

    let promise: Promise<'js> = match ctx.eval(script).catch(&ctx) {
        Ok(promise) => promise,
        Err(err) => {
            if run.watchdog.is_tripped() {
                return Err(timed_out());
            }
            // Compile errors never reach the block's own catch
            if matches!(err, CaughtError::Exception(_) | CaughtError::Value(_)) {
                run.sink.error(sandbox::describe_caught(&err, run.depth));
            }
            return Err(classify(&err, run.depth));
        }
    };

    let settled = tokio::time::timeout(
        run.watchdog.remaining(),
        promise.into_future::<Value<'js>>(),
    )
    .await;

    let value = match settled {
        Err(_) => {
            run.watchdog.trip();
            return Err(timed_out());
        }
        Ok(result) => match result.catch(&ctx) {
            Ok(value) => value,
            Err(_) if run.watchdog.is_tripped() => return Err(timed_out()),
            Err(err) => return Err(classify(&err, run.depth)),
        },
    };

    if run.watchdog.is_tripped() {
        return Err(timed_out());
    }

    if run.completion.wait_or_fallback(run.grace).await == Completion::Fallback {
        tracing::warn!(
            grace_ms = run.grace.as_millis() as u64,
            "completion signal not raised, continuing after fallback"
        );
    }

    to_script_value(&ctx, value, run.depth)
}

/// Turn a caught error into the fault it represents
fn classify(err: &CaughtError<'_>, depth: usize) -> ExecutionError {
    match err {
        CaughtError::Exception(exception) => {
            let message = exception
                .message()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| sandbox::describe_caught(err, depth));
            ExecutionError::runtime(message)
        }
        CaughtError::Value(_) => ExecutionError::runtime(sandbox::describe_caught(err, depth)),
        CaughtError::Error(e) => ExecutionError::critical(e),
    }
}

/// Convert the block's resolved value out of the engine
fn to_script_value<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
    depth: usize,
) -> Result<ScriptValue, ExecutionError> {
    match value.type_of() {
        Type::Undefined | Type::Uninitialized => return Ok(ScriptValue::Undefined),
        Type::Function | Type::Constructor | Type::Symbol => {
            return Ok(ScriptValue::Text(inspect::inspect(&value, depth)))
        }
        _ => {}
    }

    match ctx.json_stringify(value.clone()) {
        Ok(Some(json)) => {
            let text = json.to_string()?;
            match serde_json::from_str(&text) {
                Ok(json) => Ok(ScriptValue::Json(json)),
                Err(error) => {
                    // Nesting past serde_json's recursion limit
                    tracing::debug!(error = %error, "result not representable as JSON");
                    Ok(ScriptValue::Text(inspect::inspect(&value, depth)))
                }
            }
        }
        Ok(None) => Ok(ScriptValue::Text(inspect::inspect(&value, depth))),
        Err(_) => {
            // Cycles and BigInts; clear the pending exception
            let _ = ctx.catch();
            Ok(ScriptValue::Text(inspect::inspect(&value, depth)))
        }
    }
}
