//! POSIX path arithmetic for the sandbox's `path` module
//!
//! Purely lexical, like Node's `path.posix`: nothing here touches the
//! filesystem.

pub const SEP: &str = "/";
pub const DELIMITER: &str = ":";

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Resolve `.` and `..` segments and collapse repeated separators
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = is_absolute(path);
    let trailing = path.ends_with('/');
    let mut out = normalize_segments(path, absolute).join("/");

    if absolute {
        out.insert(0, '/');
    }
    if out.is_empty() {
        return match (absolute, trailing) {
            (true, _) => "/",
            (false, true) => "./",
            (false, false) => ".",
        }
        .to_string();
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

fn normalize_segments(path: &str, absolute: bool) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // `..` above the root is dropped; relative paths keep it
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }
    segments
}

pub fn join(parts: &[String]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}

/// Resolve `parts` right to left against `cwd` until a path is absolute
pub fn resolve(cwd: &str, parts: &[String]) -> String {
    let mut resolved = String::new();
    for part in parts.iter().rev().filter(|p| !p.is_empty()) {
        resolved = if resolved.is_empty() {
            part.clone()
        } else {
            format!("{}/{}", part, resolved)
        };
        if is_absolute(part) {
            break;
        }
    }
    if !is_absolute(&resolved) {
        resolved = if resolved.is_empty() {
            cwd.to_string()
        } else {
            format!("{}/{}", cwd, resolved)
        };
    }

    let normalized = normalize(&resolved);
    match normalized.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => normalized,
    }
}

/// Path of `to` relative to `from`, both resolved against `cwd`
pub fn relative(cwd: &str, from: &str, to: &str) -> String {
    let from = resolve(cwd, &[from.to_string()]);
    let to = resolve(cwd, &[to.to_string()]);
    if from == to {
        return String::new();
    }

    let from_parts: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<&str> = vec![".."; from_parts.len() - common];
    out.extend(&to_parts[common..]);
    out.join("/")
}

fn trim_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

pub fn dirname(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = trim_trailing(path);
    if trimmed == "/" {
        return "/".to_string();
    }

    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trim_trailing(&trimmed[..i]).to_string(),
        None => ".".to_string(),
    }
}

pub fn basename(path: &str, ext: Option<&str>) -> String {
    let trimmed = trim_trailing(path);
    if trimmed == "/" {
        return String::new();
    }
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);

    match ext {
        Some(ext) if !ext.is_empty() && base != ext => {
            base.strip_suffix(ext).unwrap_or(base).to_string()
        }
        _ => base.to_string(),
    }
}

pub fn extname(path: &str) -> String {
    let base = basename(path, None);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(i) => base[i..].to_string(),
    }
}
