//! Picking the code to run for "execute selection"

/// The selection when it holds code, else the cursor's line when it does
///
/// `cursor_line` is 1-based; a line past the end of `source` selects
/// nothing.
pub fn select_snippet(source: &str, selection: Option<&str>, cursor_line: usize) -> Option<String> {
    if let Some(selection) = selection.filter(|s| !s.trim().is_empty()) {
        return Some(selection.to_string());
    }

    let line = source.lines().nth(cursor_line.checked_sub(1)?)?;
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
