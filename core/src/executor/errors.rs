//! Fault taxonomy for one execution
//!
//! Every variant ends up as a `failure` outcome; nothing here ever
//! reaches the caller as an `Err`.

use crate::annotator::AnnotateError;
use crate::types::FaultKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Only raised when strict annotation is enabled
    #[error("could not annotate source: {0}")]
    Transform(#[from] AnnotateError),

    /// The script threw or rejected
    #[error("{message}")]
    Runtime { message: String },

    #[error("execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The engine or coordinator failed outside user code
    #[error("internal error: {0}")]
    Critical(String),
}

impl ExecutionError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ExecutionError::Runtime {
            message: message.into(),
        }
    }

    pub fn critical(message: impl ToString) -> Self {
        ExecutionError::Critical(message.to_string())
    }

    pub fn fault_kind(&self) -> FaultKind {
        match self {
            ExecutionError::Transform(_) => FaultKind::Transform,
            ExecutionError::Runtime { .. } => FaultKind::Runtime,
            ExecutionError::Timeout { .. } => FaultKind::Timeout,
            ExecutionError::Critical(_) => FaultKind::Critical,
        }
    }
}

impl From<rquickjs::Error> for ExecutionError {
    /// Engine errors that surface outside a script's own exception path
    fn from(e: rquickjs::Error) -> Self {
        ExecutionError::critical(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(ExecutionError::runtime("boom").to_string(), "boom");
        assert_eq!(
            ExecutionError::Timeout { timeout_ms: 500 }.to_string(),
            "execution timed out after 500ms"
        );
        assert_eq!(
            ExecutionError::critical("runtime allocation failed").to_string(),
            "internal error: runtime allocation failed"
        );
        assert_eq!(
            ExecutionError::from(AnnotateError::Syntax { line: 3 }).to_string(),
            "could not annotate source: syntax error at line 3"
        );
    }

    #[test]
    fn test_fault_kinds() {
        assert_eq!(ExecutionError::runtime("x").fault_kind(), FaultKind::Runtime);
        assert_eq!(
            ExecutionError::Timeout { timeout_ms: 1 }.fault_kind(),
            FaultKind::Timeout
        );
        assert_eq!(ExecutionError::critical("x").fault_kind(), FaultKind::Critical);
        assert_eq!(
            ExecutionError::from(AnnotateError::NoTree).fault_kind(),
            FaultKind::Transform
        );
    }
}
