//! Canonical workspace path resolution.
//!
//! All filesystem tools and verification steps resolve paths through this
//! module so "apply succeeded / verify failed" split-brain path handling
//! cannot happen. Paths resolve without requiring existence (writes need
//! to resolve paths that do not exist yet) and are accepted only inside
//! an allowlisted root.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum WorkspacePathError {
    #[error("Empty path")]
    Empty,

    #[error(
        "Path is outside allowed workspace roots for {purpose}: '{raw}'. Allowed roots: {allowed}. \
         Run rev from the target repo root, or re-run with '--workspace <repo_root>', \
         or add an allowed root via '--add-root <path>'."
    )]
    OutsideAllowedRoots {
        raw: String,
        purpose: String,
        allowed: String,
    },
}

/// A validated workspace path: absolute, inside an allowed root, plus a
/// workspace-relative POSIX view for logs and tool arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub allowed_root: PathBuf,
}

/// The workspace: a primary root plus optional additional allowed roots.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
    allowed_roots: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        let root = normalize_lexically(&root);
        Self {
            allowed_roots: vec![root.clone()],
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Allowlist one more root (e.g. from `--add-root`).
    pub fn add_allowed_root(&mut self, root: PathBuf) {
        let root = normalize_lexically(&root);
        if !self.allowed_roots.contains(&root) {
            self.allowed_roots.push(root);
        }
    }

    /// Resolve `raw` to an allowed absolute path within the workspace.
    ///
    /// `purpose` is a short label ("edit", "read") used in error messages.
    pub fn resolve(&self, raw: &str, purpose: &str) -> Result<ResolvedPath, WorkspacePathError> {
        let cleaned = clean_path_input(raw)?;
        let cleaned = self.strip_duplicate_root_prefix(&cleaned);

        let candidate = PathBuf::from(&cleaned);
        let joined = if candidate.is_absolute() {
            candidate
        } else {
            self.root.join(candidate)
        };
        let abs_path = normalize_lexically(&joined);

        for allowed_root in &self.allowed_roots {
            if is_within_root(&abs_path, allowed_root) {
                let rel_path = relative_posix(&abs_path, &self.root);
                return Ok(ResolvedPath {
                    abs_path,
                    rel_path,
                    allowed_root: allowed_root.clone(),
                });
            }
        }

        let allowed = self
            .allowed_roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(WorkspacePathError::OutsideAllowedRoots {
            raw: cleaned,
            purpose: purpose.to_string(),
            allowed,
        })
    }

    /// Planners tend to prefix workspace-relative paths with the workspace
    /// directory name (workspace `redtrade/`, emitted `redtrade/lib/x.py`).
    /// Strip one such leading segment from relative paths.
    fn strip_duplicate_root_prefix(&self, raw: &str) -> String {
        let normalized = raw.replace('\\', "/");
        if Path::new(raw).is_absolute() {
            return normalized;
        }
        let Some(root_name) = self.root.file_name().and_then(|n| n.to_str()) else {
            return normalized;
        };
        let root_lower = root_name.to_lowercase();
        let lower = normalized.to_lowercase();
        if lower == root_lower {
            return ".".to_string();
        }
        if let Some(rest) = lower.strip_prefix(&format!("{root_lower}/")) {
            tracing::debug!(raw, "stripped duplicated workspace-name prefix");
            // Preserve the original casing of the remainder.
            return normalized[normalized.len() - rest.len()..].to_string();
        }
        normalized
    }
}

fn clean_path_input(raw: &str) -> Result<String, WorkspacePathError> {
    let mut s = raw.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s = s[1..s.len() - 1].trim();
    }
    if s.is_empty() {
        return Err(WorkspacePathError::Empty);
    }
    Ok(s.to_string())
}

/// Lexical normalization: fold `.` and `..` without touching the
/// filesystem, so not-yet-existing paths resolve too.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    // Leading `..` above the root stays (and will then
                    // fail the allowlist check).
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Case-insensitive containment check (conservative across filesystems).
fn is_within_root(candidate: &Path, root: &Path) -> bool {
    let cand = candidate.to_string_lossy().to_lowercase();
    let base = root.to_string_lossy().to_lowercase();
    cand == base || cand.starts_with(&format!("{base}{}", std::path::MAIN_SEPARATOR))
}

fn relative_posix(abs: &Path, root: &Path) -> String {
    match abs.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        // Additional roots: keep a root-relative-ish view for log consistency.
        Err(_) => abs.to_string_lossy().replace('\\', "/"),
    }
}
