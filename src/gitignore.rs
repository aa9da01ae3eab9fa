// src/gitignore.rs
use crate::error::{IngestError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Make sure `.gitignore` at `path` lists `dir/` (e.g. `data/`).
///
/// Appends a `# Data directory` block when the entry is missing, preceded by a
/// blank line if the file already has content. A missing file is created.
/// Returns whether the file changed.
pub fn ensure_ignored(path: &Path, dir: &str) -> Result<bool> {
    let entry = format!("{}/", dir.trim_end_matches('/'));
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(IngestError::io(path, e)),
    };

    if content.contains(&entry) {
        return Ok(false);
    }

    let block = if content.is_empty() {
        format!("# Data directory\n{entry}\n")
    } else {
        format!("\n# Data directory\n{entry}\n")
    };
    fs::write(path, content + &block).map_err(|e| IngestError::io(path, e))?;
    info!(entry = %entry, file = %path.display(), "added to .gitignore");
    Ok(true)
}
