use std::path::Path;
use std::sync::LazyLock;

use ignore::WalkBuilder;
use regex::Regex;

use rev_core::task::Task;

/// Path-ish tokens in a task description: anything with a known code/config
/// extension, optionally with a `.bak` backup suffix.
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\./)?[A-Za-z0-9_][A-Za-z0-9_./-]*\.(?:py|pyi|js|jsx|ts|tsx|vue|mjs|cjs|go|rs|rb|java|json|toml|yaml|yml|md)(?:\.bak)?\b",
    )
    .unwrap()
});

/// Directories never searched for basename matches.
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

const MATCH_LIMIT: usize = 25;

/// Result of the path preflight.
#[derive(Debug, Clone)]
pub struct PathCheck {
    pub ok: bool,
    pub messages: Vec<String>,
}

/// Rewrite path tokens in `description` against the workspace:
/// canonicalize existing paths to workspace-relative POSIX form, dedupe
/// accidentally nested prefixes, and rescue missing paths by unique
/// basename match. Idempotent: a second run returns the same description.
///
/// Returns the rewritten description, log messages, the count of tokens
/// that resolve to existing files, and the unresolved-missing complaints.
pub fn rewrite_paths(
    description: &str,
    workspace_root: &Path,
) -> (String, Vec<String>, usize, Vec<String>) {
    let mut desc = description.to_string();
    let mut messages = Vec::new();
    let mut existing = 0usize;
    let mut missing = Vec::new();

    let mut tokens: Vec<String> = PATH_TOKEN
        .find_iter(description)
        .map(|m| m.as_str().to_string())
        .collect();
    tokens.sort();
    tokens.dedup();
    // Longest first, so "analysts.py" never rewrites inside "lib/analysts.py".
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

    for raw in tokens {
        // Package init files are everywhere; rescue would always tie.
        if raw.ends_with("/__init__.py") || raw == "__init__.py" {
            if workspace_root.join(normalize_token(&raw)).exists() {
                existing += 1;
            }
            continue;
        }

        let normalized = dedupe_nested_prefix(&normalize_token(&raw));
        let abs = workspace_root.join(&normalized);

        if abs.exists() {
            existing += 1;
            if normalized != raw {
                desc = replace_token(&desc, &raw, &normalized);
                messages.push(format!("normalized path '{raw}' -> '{normalized}'"));
            }
            continue;
        }

        // Missing: search the workspace by basename (including the
        // `.py <-> .py.bak` pairing the split tool produces).
        let basename = normalized.rsplit('/').next().unwrap_or(&normalized).to_string();
        let mut basenames = vec![basename.clone()];
        if let Some(stripped) = basename.strip_suffix(".bak") {
            basenames.push(stripped.to_string());
        } else if basename.ends_with(".py") {
            basenames.push(format!("{basename}.bak"));
        }

        let mut matches = Vec::new();
        for bn in &basenames {
            matches.extend(find_by_basename(workspace_root, bn));
        }
        matches.sort();
        matches.dedup();

        match choose_best_match(&normalized, &matches) {
            Some(chosen) => {
                desc = replace_token(&desc, &raw, &chosen);
                if normalized != raw {
                    desc = replace_token(&desc, &normalized, &chosen);
                }
                messages.push(format!("corrected missing path '{raw}' -> '{chosen}'"));
                existing += 1;
            }
            None if matches.is_empty() => {
                missing.push(format!("missing path '{raw}' (no matches found)"));
            }
            None => {
                let shown: Vec<&String> = matches.iter().take(5).collect();
                missing.push(format!("ambiguous missing path '{raw}' (matches={shown:?})"));
            }
        }
    }

    (desc, messages, existing, missing)
}

/// Apply the path preflight policy to a task, rewriting its description
/// in place.
///
/// Read-like actions must not reference missing files. Mutating actions
/// may reference output paths that do not exist yet, but fail when no
/// referenced path exists at all, or when the only existing source is a
/// `*.py.bak` backup (operating on backup-only state is forbidden).
pub fn check_task_paths(task: &mut Task, workspace_root: &Path) -> PathCheck {
    // Checked before path rescue, which would otherwise rewrite the dead
    // `.py` reference into its `.py.bak` backup and mask the condition.
    if task.action.is_mutating() && backup_only_source(&task.description, workspace_root) {
        return PathCheck {
            ok: false,
            messages: vec![
                "source file exists only as a *.py.bak backup; operate on the split package instead"
                    .to_string(),
            ],
        };
    }

    let (desc, mut messages, existing, missing) = rewrite_paths(&task.description, workspace_root);
    for message in &messages {
        tracing::debug!(task = %task.id, "{message}");
    }
    task.description = desc;

    if missing.is_empty() {
        return PathCheck { ok: true, messages };
    }

    if task.action.is_read_only() {
        messages.push(missing[0].clone());
        return PathCheck { ok: false, messages };
    }

    if existing == 0 {
        messages.push(missing[0].clone());
        return PathCheck { ok: false, messages };
    }

    messages.push("ignored missing output path(s); at least one input path exists".to_string());
    PathCheck { ok: true, messages }
}

fn normalize_token(raw: &str) -> String {
    raw.trim().trim_start_matches("./").replace('\\', "/")
}

/// Replace whole-token occurrences of `from` (never a substring of a
/// longer path token).
fn replace_token(haystack: &str, from: &str, to: &str) -> String {
    fn is_token_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
    }

    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.find(from) {
        let boundary_before = rest[..pos].chars().next_back().map(|c| !is_token_char(c)).unwrap_or(true);
        let boundary_after = rest[pos + from.len()..]
            .chars()
            .next()
            .map(|c| !is_token_char(c))
            .unwrap_or(true);
        out.push_str(&rest[..pos]);
        out.push_str(if boundary_before && boundary_after { to } else { from });
        rest = &rest[pos + from.len()..];
    }
    out.push_str(rest);
    out
}

/// Collapse a duplicated leading directory run:
/// `lib/analysts/lib/analysts/__init__.py` -> `lib/analysts/__init__.py`.
fn dedupe_nested_prefix(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    for width in (1..=segments.len() / 2).rev() {
        if segments.len() >= 2 * width && segments[..width] == segments[width..2 * width] {
            return segments[width..].join("/");
        }
    }
    path.to_string()
}

/// Workspace-relative POSIX paths whose basename matches, skipping
/// transient directories.
fn find_by_basename(root: &Path, basename: &str) -> Vec<String> {
    let mut hits = Vec::new();
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
        if hits.len() >= MATCH_LIMIT {
            break;
        }
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.eq_ignore_ascii_case(basename));
        if !matches {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            hits.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    hits
}

/// Pick the most likely intended match, or None when ambiguous.
fn choose_best_match(original: &str, matches: &[String]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    if matches.len() == 1 {
        return Some(matches[0].clone());
    }

    let original_lower = original.to_lowercase();
    let score = |rel: &str| -> (i32, i32) {
        let p = rel.to_lowercase();
        let wrapped = format!("/{p}/");
        let mut score = 0;
        if wrapped.contains("/lib/") {
            score += 10;
        }
        if wrapped.contains("/src/") {
            score += 8;
        }
        if wrapped.contains("/app/") {
            score += 6;
        }
        if wrapped.contains("/tests/") {
            score -= 5;
        }
        if p.ends_with(&original_lower) {
            score += 3;
        }
        let depth = p.matches('/').count() as i32;
        (score, -depth)
    };

    let mut ranked: Vec<&String> = matches.iter().collect();
    ranked.sort_by_key(|m| std::cmp::Reverse(score(m)));
    // A tie on the primary score means we cannot pick safely.
    if score(ranked[0]).0 == score(ranked[1]).0 {
        return None;
    }
    Some(ranked[0].clone())
}

/// True when the description references a `.py` source that exists only
/// as its `.py.bak` backup.
fn backup_only_source(description: &str, root: &Path) -> bool {
    for token in PATH_TOKEN.find_iter(description) {
        let normalized = normalize_token(token.as_str());
        if !normalized.ends_with(".py") {
            continue;
        }
        let live = root.join(&normalized);
        let backup = root.join(format!("{normalized}.bak"));
        if !live.exists() && backup.exists() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rev_core::action::ActionKind;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("lib/analysts.py"), "class A: pass\n").unwrap();
        fs::write(dir.path().join("tests/test_analysts.py"), "def test(): pass\n").unwrap();
        dir
    }

    #[test]
    fn test_existing_path_untouched() {
        let ws = workspace();
        let (desc, messages, existing, missing) =
            rewrite_paths("review lib/analysts.py structure", ws.path());
        assert_eq!(desc, "review lib/analysts.py structure");
        assert!(messages.is_empty());
        assert_eq!(existing, 1);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_basename_rescue_unique_match() {
        let ws = workspace();
        let (desc, messages, existing, _) = rewrite_paths("edit analysts.py imports", ws.path());
        assert_eq!(desc, "edit lib/analysts.py imports");
        assert!(messages[0].contains("corrected missing path"));
        assert_eq!(existing, 1);
    }

    #[test]
    fn test_ambiguous_match_is_not_substituted() {
        let ws = workspace();
        fs::create_dir_all(ws.path().join("other")).unwrap();
        fs::write(ws.path().join("other/util.py"), "").unwrap();
        fs::create_dir_all(ws.path().join("another")).unwrap();
        fs::write(ws.path().join("another/util.py"), "").unwrap();

        let (desc, _, existing, missing) = rewrite_paths("edit util.py", ws.path());
        assert_eq!(desc, "edit util.py");
        assert_eq!(existing, 0);
        assert!(missing[0].contains("ambiguous"));
    }

    #[test]
    fn test_lib_preferred_over_tests() {
        let ws = workspace();
        fs::write(ws.path().join("tests/analysts.py"), "").unwrap();
        let (desc, _, _, _) = rewrite_paths("edit analysts.py", ws.path());
        assert_eq!(desc, "edit lib/analysts.py");
    }

    #[test]
    fn test_nested_prefix_dedupe() {
        let ws = workspace();
        fs::create_dir_all(ws.path().join("lib/analysts")).unwrap();
        fs::write(ws.path().join("lib/analysts/base.py"), "").unwrap();
        let (desc, messages, _, _) =
            rewrite_paths("edit lib/analysts/lib/analysts/base.py", ws.path());
        assert_eq!(desc, "edit lib/analysts/base.py");
        assert!(messages[0].contains("normalized path"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let ws = workspace();
        let (once, _, _, _) = rewrite_paths("edit analysts.py imports", ws.path());
        let (twice, messages, _, _) = rewrite_paths(&once, ws.path());
        assert_eq!(once, twice);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_read_task_with_missing_path_fails() {
        let ws = workspace();
        let mut t = Task::new(ActionKind::Read, "read lib/nonexistent_module.py");
        let check = check_task_paths(&mut t, ws.path());
        assert!(!check.ok);
        assert!(check.messages.iter().any(|m| m.contains("missing path")));
    }

    #[test]
    fn test_mutating_task_with_one_existing_path_passes() {
        let ws = workspace();
        let mut t = Task::new(
            ActionKind::Edit,
            "edit lib/analysts.py and write lib/analysts_new.py",
        );
        let check = check_task_paths(&mut t, ws.path());
        assert!(check.ok);
        assert!(check.messages.iter().any(|m| m.contains("ignored missing output path")));
    }

    #[test]
    fn test_mutating_task_with_all_missing_fails() {
        let ws = workspace();
        let mut t = Task::new(ActionKind::Edit, "edit lib/ghost_a_module.py");
        let check = check_task_paths(&mut t, ws.path());
        assert!(!check.ok);
    }

    #[test]
    fn test_backup_only_source_fails_mutating() {
        let ws = workspace();
        fs::write(ws.path().join("lib/broker.py.bak"), "").unwrap();
        let mut t = Task::new(ActionKind::Edit, "edit lib/broker.py to fix the import");
        let check = check_task_paths(&mut t, ws.path());
        assert!(!check.ok);
        assert!(check.messages.iter().any(|m| m.contains(".py.bak")));
    }

    #[test]
    fn test_excluded_dirs_not_searched() {
        let ws = workspace();
        fs::create_dir_all(ws.path().join("node_modules/pkg")).unwrap();
        fs::write(ws.path().join("node_modules/pkg/index.js"), "").unwrap();
        let (_, _, existing, missing) = rewrite_paths("edit index.js", ws.path());
        assert_eq!(existing, 0);
        assert!(missing[0].contains("no matches found"));
    }

    #[test]
    fn test_init_py_is_left_alone() {
        let ws = workspace();
        fs::create_dir_all(ws.path().join("lib/analysts")).unwrap();
        fs::write(ws.path().join("lib/analysts/__init__.py"), "").unwrap();
        let input = "edit lib/analysts/__init__.py exports";
        let (desc, messages, existing, missing) = rewrite_paths(input, ws.path());
        assert_eq!(desc, input);
        assert!(messages.is_empty());
        assert_eq!(existing, 1);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_replace_token_respects_boundaries() {
        let out = replace_token("edit analysts.py and lib/analysts.py", "analysts.py", "lib/analysts.py");
        assert_eq!(out, "edit lib/analysts.py and lib/analysts.py");
    }

    #[test]
    fn test_descriptions_without_paths_pass() {
        let ws = workspace();
        let mut t = Task::new(ActionKind::Analyze, "summarize the repository layout");
        let check = check_task_paths(&mut t, ws.path());
        assert!(check.ok);
        assert!(check.messages.is_empty());
    }
}
