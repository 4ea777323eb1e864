use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions ingested as plain text. Binary document formats are not parsed.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "rst", "csv", "json", "yaml", "yml", "toml"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Supported files under `dir`, sorted for a stable ingestion order.
/// Hidden directories (`.git`, ...) are skipped.
pub fn walk_directory(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported(path))
        .collect();

    files.sort();
    files
}
