use std::path::Path;

use anyhow::{Context, Result};

use super::cleaner::clean_text;

/// Cleaned text shorter than this carries nothing worth retrieving.
pub const MIN_TEXT_CHARS: usize = 10;

/// Reads a plain-text file (invalid UTF-8 replaced) and cleans it.
/// Returns `None` when nothing substantive is left.
pub fn extract_text(path: &Path) -> Result<Option<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read text file: {}", path.display()))?;
    let text = clean_text(&String::from_utf8_lossy(&bytes));

    if text.chars().count() < MIN_TEXT_CHARS {
        return Ok(None);
    }
    Ok(Some(text))
}
