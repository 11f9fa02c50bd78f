//! Test helpers for coordinator tests
//!
//! Options that keep runs hermetic, plus shorthands for reading results.

use crate::executor::{execute, ExecuteOptions};
use crate::sandbox::SandboxOptions;
use crate::types::{ExecutionResult, Line, LogKind, ScriptValue};
use std::collections::BTreeMap;

/// Options with an empty environment and the given wall-clock bound
pub fn options(timeout_ms: u64) -> ExecuteOptions {
    ExecuteOptions::default()
        .with_timeout_ms(timeout_ms)
        .with_sandbox(SandboxOptions::default().with_env(BTreeMap::new()))
}

/// Run `source` with a generous bound
pub async fn run(source: &str) -> ExecutionResult {
    execute(source, &options(5_000)).await
}

/// `(kind, message, line)` triples, for compact assertions
pub fn log_of(result: &ExecutionResult) -> Vec<(LogKind, String, Line)> {
    result
        .log
        .iter()
        .map(|entry| (entry.kind, entry.message.clone(), entry.line))
        .collect()
}

/// The resolved JSON value, panicking on anything else
pub fn json_value(result: &ExecutionResult) -> serde_json::Value {
    match result.value() {
        Some(ScriptValue::Json(value)) => value.clone(),
        other => panic!(
            "expected a JSON value, got {:?} (error: {:?}, log: {:?})",
            other,
            result.error(),
            result.log
        ),
    }
}
