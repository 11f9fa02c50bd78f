use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/* ===================== Log Entries ===================== */

/// Which diagnostic method produced a log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LogKind {
    Info,
    Warning,
    Error,
    PlainLog,
}

impl LogKind {
    /// Map a `console` method name to its kind
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "log" => Some(LogKind::PlainLog),
            "info" => Some(LogKind::Info),
            "warn" => Some(LogKind::Warning),
            "error" => Some(LogKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Warning => "warning",
            LogKind::Error => "error",
            LogKind::PlainLog => "plain-log",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source line a log entry is attributed to
///
/// Serialized as a positive integer, or the string `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Known(u32),
    Unknown,
}

impl Line {
    /// Build a line from a raw number; anything below 1 is unknown
    pub fn from_raw(raw: i64) -> Self {
        if raw >= 1 && raw <= u32::MAX as i64 {
            Line::Known(raw as u32)
        } else {
            Line::Unknown
        }
    }

    pub fn number(&self) -> Option<u32> {
        match self {
            Line::Known(n) => Some(*n),
            Line::Unknown => None,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Known(n) => write!(f, "{}", n),
            Line::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for Line {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Line::Known(n) => serializer.serialize_u32(*n),
            Line::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Line {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Number(n) => n
                .as_i64()
                .map(Line::from_raw)
                .ok_or_else(|| de::Error::custom("line must be an integer")),
            JsonValue::String(s) if s == "unknown" => Ok(Line::Unknown),
            other => Err(de::Error::custom(format!("invalid line: {}", other))),
        }
    }
}

/// One captured diagnostic call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub line: Line,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>, line: Line) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }
}

/* ===================== Script Values ===================== */

/// Value a script resolved to, converted out of the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ScriptValue {
    Undefined,
    /// Anything `JSON.stringify` can represent
    Json(JsonValue),
    /// Inspected text for values JSON cannot carry (functions, symbols)
    Text(String),
}

impl ScriptValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }

    /// Render the value the way the output pane shows results
    pub fn display(&self) -> String {
        match self {
            ScriptValue::Undefined => "undefined".to_string(),
            ScriptValue::Json(JsonValue::String(s)) => s.clone(),
            ScriptValue::Json(JsonValue::Null) => "null".to_string(),
            ScriptValue::Json(other) => {
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            }
            ScriptValue::Text(text) => text.clone(),
        }
    }
}

/* ===================== Execution Result ===================== */

/// Which part of the pipeline a failure came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// Annotation failed and strict annotation was requested
    Transform,
    /// The script threw or rejected
    Runtime,
    /// The wall-clock bound elapsed
    Timeout,
    /// The coordinator itself failed
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { value: ScriptValue },
    Failure { message: String, fault: FaultKind },
}

/// The envelope returned for every execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub log: Vec<LogEntry>,
}

impl ExecutionResult {
    pub fn success(value: ScriptValue, log: Vec<LogEntry>) -> Self {
        Self {
            outcome: Outcome::Success { value },
            log,
        }
    }

    pub fn failure(message: impl Into<String>, fault: FaultKind, log: Vec<LogEntry>) -> Self {
        Self {
            outcome: Outcome::Failure {
                message: message.into(),
                fault,
            },
            log,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Resolved value, if the run succeeded
    pub fn value(&self) -> Option<&ScriptValue> {
        match &self.outcome {
            Outcome::Success { value } => Some(value),
            Outcome::Failure { .. } => None,
        }
    }

    /// Failure message, if the run failed
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message, .. } => Some(message),
        }
    }

    pub fn fault(&self) -> Option<FaultKind> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { fault, .. } => Some(*fault),
        }
    }
}

/* ===================== Save File ===================== */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub path: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
