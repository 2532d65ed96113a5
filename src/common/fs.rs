//! Scratch-file helpers.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;
use tracing::warn;

/// Removes `path`, treating an already-missing file as success.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Like [`remove_if_exists`] but only logs failures.
pub async fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
    }
}

/// Maps an arbitrary label onto something safe to embed in a file name.
pub fn file_component(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "_".to_string() } else { cleaned }
}
