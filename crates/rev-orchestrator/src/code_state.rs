use std::path::Path;

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

/// Directories excluded from the code-state hash (transient or internal).
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".rev",
    "__pycache__",
    "node_modules",
    ".pytest_cache",
    "target",
    "dist",
    "build",
    ".venv",
    "venv",
];

/// Cheap content-state fingerprint of the workspace: relative path, size
/// and mtime of every tracked file. Used to suppress re-running tests at
/// a code state that already ran green.
pub fn code_state_hash(root: &Path) -> String {
    let mut entries: Vec<String> = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !EXCLUDED_DIRS.contains(&name))
                .unwrap_or(true)
        })
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        entries.push(format!(
            "{}:{}:{}",
            rel.to_string_lossy().replace('\\', "/"),
            metadata.len(),
            mtime
        ));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for entry in &entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
