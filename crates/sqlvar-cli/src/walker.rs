use std::fs;
use std::path::{Path, PathBuf};

/// A regular file under the processing root, with its root-relative path.
pub struct WalkedFile {
    pub path: PathBuf,
    pub rel: String,
}

/// Extensions copied verbatim, bypassing macro handling entirely.
const VERBATIM_EXTENSIONS: &[&str] = &[".zip", ".json", ".csv"];

/// Hidden entries are not transpiled or copied at all.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Processable files are subject to macro expansion and unexpansion;
/// everything else is copied byte-for-byte.
pub fn is_processable(name: &str) -> bool {
    let lower = name.to_lowercase();
    !VERBATIM_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Recursively collect regular files under `root`. Relative paths use
/// forward slashes and the result is sorted, so the processing order (and
/// with it any seeded randomness) is deterministic.
pub fn walk(root: &Path) -> Result<Vec<WalkedFile>, String> {
    if !root.is_dir() {
        return Err(format!("Not a directory: {}", root.display()));
    }
    let mut files = Vec::new();
    collect(root, root, &mut files)?;
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<WalkedFile>) -> Result<(), String> {
    let entries =
        fs::read_dir(dir).map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read {}: {e}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) {
            continue;
        }
        if path.is_dir() {
            collect(root, &path, out)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|e| format!("Path outside root {}: {e}", path.display()))?
            .to_string_lossy()
            .replace('\\', "/");
        out.push(WalkedFile { path, rel });
    }
    Ok(())
}
