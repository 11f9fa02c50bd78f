//! Capturing diagnostic sink
//!
//! Receives every `console.*` call made inside a sandbox and appends a
//! [`LogEntry`] to a private, ordered log. The JavaScript side of the
//! console (see `prelude.js`) already separated the line tag from the
//! user's arguments; when there was no tag it hands over a stack trace
//! instead, which is parsed here.

use crate::sandbox::inspect;
use crate::types::{Line, LogEntry, LogKind};
use regex::Regex;
use rquickjs::prelude::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::sync::{Arc, Mutex, OnceLock};

/// Frame line number: `at fn (file:12:5)`, `at file:12`, ...
fn frame_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r":(\d+)(?::\d+)?\)?\s*$").expect("frame pattern is valid")
    })
}

/// Where stack-derived line numbers are mapped back to the user's source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMapping {
    /// Lines the wrapper puts in front of the user's first line
    pub preamble_lines: u32,
    /// Number of lines in the user's source
    pub source_lines: u32,
}

impl LineMapping {
    pub fn new(preamble_lines: u32, source: &str) -> Self {
        Self {
            preamble_lines,
            source_lines: source.lines().count().max(1) as u32,
        }
    }

    /// Map a line of the evaluated script back to the user's source
    pub fn to_source(&self, script_line: u32) -> Line {
        match script_line.checked_sub(self.preamble_lines) {
            Some(line) if (1..=self.source_lines).contains(&line) => Line::Known(line),
            _ => Line::Unknown,
        }
    }
}

/// File name the engine reports for code built with the `Function`
/// constructor, which is how the prelude is compiled
pub const PRELUDE_FILE: &str = "<input>";

/// Best-effort caller line from a stack trace captured in the console shim
///
/// The first frame is the shim itself and is skipped, as are prelude frames
/// and native frames that carry no position.
pub fn line_from_stack(stack: &str, mapping: LineMapping) -> Line {
    stack
        .lines()
        .map(str::trim)
        .filter(|frame| frame.starts_with("at "))
        .skip(1)
        .filter(|frame| !frame.contains(PRELUDE_FILE))
        .find_map(|frame| {
            frame_line_pattern()
                .captures(frame)
                .and_then(|caps| caps[1].parse::<u32>().ok())
        })
        .map(|line| mapping.to_source(line))
        .unwrap_or(Line::Unknown)
}

#[derive(Debug, Default)]
struct SinkState {
    entries: Vec<LogEntry>,
    dropped: usize,
}

/// Ordered, capped log shared between the console bindings and the
/// coordinator of one execution
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    state: Arc<Mutex<SinkState>>,
    max_entries: usize,
    inspect_depth: usize,
    mapping: LineMapping,
}

impl DiagnosticSink {
    pub fn new(max_entries: usize, inspect_depth: usize, mapping: LineMapping) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            max_entries,
            inspect_depth,
            mapping,
        }
    }

    pub fn inspect_depth(&self) -> usize {
        self.inspect_depth
    }

    /// Append one entry, respecting the cap
    pub fn push(&self, entry: LogEntry) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.entries.len() >= self.max_entries {
            state.dropped += 1;
            return;
        }
        state.entries.push(entry);
    }

    /// Record a `console.<method>` call
    ///
    /// `line` is the tagged line (or a negative sentinel when untagged),
    /// `stack` the shim's stack trace for untagged calls.
    pub fn emit(&self, kind: LogKind, line: f64, stack: Option<&str>, args: &[Value<'_>]) {
        let line = if line >= 1.0 {
            Line::from_raw(line as i64)
        } else {
            stack
                .map(|stack| line_from_stack(stack, self.mapping))
                .unwrap_or(Line::Unknown)
        };

        let message = inspect::display_all(args, self.inspect_depth);
        self.push(LogEntry::new(kind, message, line));
    }

    /// Record an exception that escaped user code
    pub fn fault(&self, error: &Value<'_>) {
        let message = inspect::display(error, self.inspect_depth);
        self.push(LogEntry::new(LogKind::Error, message, Line::Unknown));
    }

    /// Record an error message produced outside the script
    pub fn error(&self, message: impl Into<String>) {
        self.push(LogEntry::new(LogKind::Error, message, Line::Unknown));
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the log, with a truncation notice when entries were dropped
    pub fn entries(&self) -> Vec<LogEntry> {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut entries = state.entries.clone();
        if state.dropped > 0 {
            entries.push(LogEntry::new(
                LogKind::Info,
                format!("... output truncated ({} entry limit)", self.max_entries),
                Line::Unknown,
            ));
        }
        entries
    }
}

/// Install `emit` and `fault` on the prelude's native object
pub fn install<'js>(ctx: &Ctx<'js>, native: &Object<'js>, sink: DiagnosticSink) -> rquickjs::Result<()> {
    let emit_sink = sink.clone();
    let emit = Function::new(
        ctx.clone(),
        move |method: String, line: f64, stack: Option<String>, args: Rest<Value<'js>>| {
            let kind = LogKind::from_method(&method).unwrap_or(LogKind::PlainLog);
            emit_sink.emit(kind, line, stack.as_deref(), &args.0);
        },
    )?
    .with_name("emit")?;
    native.set("emit", emit)?;

    let fault = Function::new(ctx.clone(), move |error: Value<'js>| sink.fault(&error))?
        .with_name("__fault__")?;
    native.set("fault", fault)?;

    Ok(())
}
