//! Reading and saving scratchpad files

use crate::types::{SaveRequest, SaveResponse};
use anyhow::{Context, Result};
use std::path::Path;

/// Error returned when a save arrives without a destination
pub const MISSING_PATH_ERROR: &str =
    "no destination path given; resolve a save location before saving";

/// Write `content` to the requested path as UTF-8
///
/// Never fails: problems are reported in the response. Parent directories
/// are not created.
pub fn save_file(request: SaveRequest) -> SaveResponse {
    let path = match request.path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => path.to_string(),
        None => {
            return SaveResponse {
                success: false,
                path: None,
                error: Some(MISSING_PATH_ERROR.to_string()),
            }
        }
    };

    match std::fs::write(&path, request.content.as_bytes()) {
        Ok(()) => {
            tracing::info!(path = %path, bytes = request.content.len(), "file saved");
            SaveResponse {
                success: true,
                path: Some(path),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "failed to save file");
            SaveResponse {
                success: false,
                path: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Load a script from disk
pub fn open_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
