//! # Source Annotator
//!
//! Tags every `console.<method>(...)` call with the line it appears on, so
//! the diagnostic sink can attribute output without inspecting stacks.
//!
//! ```js
//! console.log('a', x)          // line 3
//! ```
//!
//! becomes
//!
//! ```js
//! console.log('a', x, __line__(3))
//! ```
//!
//! `__line__` is provided by the sandbox and returns an object keyed by a
//! private symbol, so a tag cannot collide with anything the user passes.
//!
//! Only the plain two-part shape is recognized. Aliases (`const c = console`),
//! computed access (`console['log']`) and tagged templates are left alone and
//! fall back to stack-based attribution at runtime.

pub mod patch;


use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

pub use patch::{apply_patches, Patch};

/// Name of the sandbox function producing line tags
pub const LINE_TAG_FN: &str = "__line__";

/// Diagnostic object recognized by the annotator
pub const DIAGNOSTIC_OBJECT: &str = "console";

/// Methods recognized by the annotator
pub const DIAGNOSTIC_METHODS: [&str; 4] = ["log", "info", "warn", "error"];

/* ===================== Error Types ===================== */

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("JavaScript grammar could not be loaded: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("syntax error at line {line}")]
    Syntax { line: usize },
}

/* ===================== Public API ===================== */

/// Result of a successful annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub source: String,
    /// Number of calls that received a line tag
    pub tagged_calls: usize,
}

/// Annotate `source`, returning it unchanged if it cannot be parsed
pub fn annotate(source: &str) -> String {
    match try_annotate(source) {
        Ok(annotation) => annotation.source,
        Err(e) => {
            tracing::warn!(error = %e, "annotation failed, falling back to stack attribution");
            source.to_string()
        }
    }
}

/// Annotate `source`, reporting why it could not be parsed
pub fn try_annotate(source: &str) -> Result<Annotation, AnnotateError> {
    let tree = parse(source)?;
    let root = tree.root_node();

    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(AnnotateError::Syntax { line });
    }

    let patches = collect_patches(root, source.as_bytes());
    let tagged_calls = patches.len();

    tracing::debug!(tagged_calls, "annotated diagnostic calls");

    Ok(Annotation {
        source: apply_patches(source, patches),
        tagged_calls,
    })
}

/* ===================== Parsing ===================== */

fn parse(source: &str) -> Result<Tree, AnnotateError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_javascript::LANGUAGE.into())?;
    parser.parse(source, None).ok_or(AnnotateError::NoTree)
}

/// 1-based line of the first ERROR or MISSING node, in document order
fn first_error_line(root: Node) -> Option<usize> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }

        // Only descend into subtrees that contain the error
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/* ===================== Call Matching ===================== */

/// Walk the tree and record one patch per recognized diagnostic call
fn collect_patches(root: Node, source: &[u8]) -> Vec<Patch> {
    let mut patches = Vec::new();
    let mut cursor = root.walk();

    loop {
        let node = cursor.node();
        if let Some(patch) = patch_for_call(node, source) {
            patches.push(patch);
        }

        if cursor.goto_first_child() {
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return patches;
            }
        }
    }
}

/// Build the insertion for `node` if it is a recognized diagnostic call
fn patch_for_call(node: Node, source: &[u8]) -> Option<Patch> {
    if node.kind() != "call_expression" {
        return None;
    }

    let callee = node.child_by_field_name("function")?;
    if !is_diagnostic_member(callee, source) {
        return None;
    }

    // Tagged templates put a template_string here
    let arguments = node.child_by_field_name("arguments")?;
    if arguments.kind() != "arguments" {
        return None;
    }

    let close = arguments.child(arguments.child_count().checked_sub(1)?)?;
    if close.kind() != ")" {
        return None;
    }

    let line = node.start_position().row + 1;
    let tag = format!("{}({})", LINE_TAG_FN, line);

    let text = match last_token_before_close(arguments) {
        None => tag,
        Some(",") => format!(" {}", tag),
        Some(_) => format!(", {}", tag),
    };

    Some(Patch::insert(close.start_byte(), text))
}

/// `console.log`, `console.info`, ... (optionally `console?.log`)
fn is_diagnostic_member(callee: Node, source: &[u8]) -> bool {
    if callee.kind() != "member_expression" {
        return false;
    }

    let (Some(object), Some(property)) = (
        callee.child_by_field_name("object"),
        callee.child_by_field_name("property"),
    ) else {
        return false;
    };

    if object.kind() != "identifier" || property.kind() != "property_identifier" {
        return false;
    }

    let object_name = object.utf8_text(source).unwrap_or_default();
    let method = property.utf8_text(source).unwrap_or_default();

    object_name == DIAGNOSTIC_OBJECT && DIAGNOSTIC_METHODS.contains(&method)
}

/// Kind of the last non-comment token inside `( ... )`, if any
fn last_token_before_close(arguments: Node) -> Option<&'static str> {
    let count = arguments.child_count();
    // Skip the closing paren itself; stop at the opening one
    (1..count.saturating_sub(1))
        .rev()
        .filter_map(|i| arguments.child(i))
        .find(|child| child.kind() != "comment")
        .map(|child| child.kind())
}
