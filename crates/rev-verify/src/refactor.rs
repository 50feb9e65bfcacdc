use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_core::verification::VerificationResult;
use rev_tools::{Dispatcher, WRITE_TOOLS};
use rev_workspace::Workspace;

use crate::resolve::parse_task_result_payload;
use crate::runner::run_validation_command;

pub const NO_FILES_MESSAGE: &str = "extraction created directory but extracted NO FILES";

static RELATIVE_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+\.([A-Za-z_][A-Za-z0-9_]*)\s+import\b").unwrap());

static ALL_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)__all__\s*=\s*\[(.*?)\]").unwrap());

static DESC_PY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_./-]+\.py\b").unwrap());

const SOURCE_LEFT_MARKER: &str = "source left for llm";

/// Verify a package-extraction refactor: the target directory exists,
/// contains output modules whose relative imports resolve, and the
/// original single-file source is gone (or explicitly left behind).
pub async fn verify_refactoring(
    task: &Task,
    ctx: &mut ExecutionContext,
    workspace: &Workspace,
    dispatcher: &Dispatcher,
) -> VerificationResult {
    if !task.has_writing_event(WRITE_TOOLS) {
        return VerificationResult::fail(
            "Refactor task recorded no writing tool call; nothing was restructured",
            true,
        );
    }

    let Some(target_dir) = resolve_target_directory(task, ctx, workspace) else {
        return VerificationResult::fail("Could not determine refactoring target directory", true);
    };
    let rel_dir = target_dir
        .strip_prefix(workspace.root())
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| target_dir.to_string_lossy().into_owned());

    if !target_dir.is_dir() {
        return VerificationResult::fail(
            format!("Refactoring target directory does not exist: {rel_dir}"),
            true,
        );
    }

    let modules = python_modules(&target_dir);
    if modules.is_empty() {
        return VerificationResult::fail(NO_FILES_MESSAGE, true)
            .with_detail("dir_path", json!(rel_dir));
    }

    let mut result = VerificationResult::pass(format!(
        "Refactoring verified: {rel_dir} contains {} module(s)",
        modules.len()
    ))
    .with_detail("dir_path", json!(rel_dir))
    .with_detail("modules", json!(modules.len()));
    let mut warnings: Vec<String> = Vec::new();

    // Relative imports in each output module must reference siblings that
    // actually exist.
    let stems: Vec<String> = modules
        .iter()
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    for module in &modules {
        let Ok(content) = std::fs::read_to_string(module) else {
            continue;
        };
        for caps in RELATIVE_IMPORT.captures_iter(&content) {
            let imported = &caps[1];
            if !stems.iter().any(|s| s == imported) {
                return VerificationResult::fail(
                    format!(
                        "Module {} imports '.{}' which does not exist in {rel_dir}",
                        module.file_name().unwrap_or_default().to_string_lossy(),
                        imported
                    ),
                    true,
                )
                .with_detail("dir_path", json!(rel_dir));
            }
        }
    }

    // __init__.py should re-export every split module.
    let init_path = target_dir.join("__init__.py");
    if init_path.exists() {
        let content = std::fs::read_to_string(&init_path).unwrap_or_default();
        let split_stems: Vec<&String> = stems.iter().filter(|s| *s != "__init__").collect();
        if let Some(caps) = ALL_EXPORT.captures(&content) {
            let exports = caps[1].to_lowercase();
            let missing: Vec<&&String> = split_stems
                .iter()
                .filter(|stem| !exports.contains(&stem.to_lowercase()) && !content.contains(&format!(".{stem}")))
                .collect();
            if !missing.is_empty() {
                return VerificationResult::fail(
                    format!(
                        "__init__.py __all__ does not export split module(s): {}",
                        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                    true,
                )
                .with_detail("dir_path", json!(rel_dir));
            }
        } else if RELATIVE_IMPORT.is_match(&content) {
            warnings.push("__init__.py has explicit imports but no __all__".to_string());
        } else if !split_stems.is_empty() {
            return VerificationResult::fail(
                "__init__.py exports nothing: no __all__ and no imports",
                true,
            )
            .with_detail("dir_path", json!(rel_dir));
        }
    }

    // The pre-split single-file source must be gone unless the tool said
    // it deliberately left it.
    if let Some(source) = original_source_path(task, &target_dir, workspace) {
        if source.exists() {
            if source_left_intentionally(task) {
                warnings.push(format!(
                    "source file {} left in place by the split tool",
                    source.file_name().unwrap_or_default().to_string_lossy()
                ));
            } else {
                return VerificationResult::fail(
                    format!(
                        "Source file still exists after extraction: {}",
                        source
                            .strip_prefix(workspace.root())
                            .map(|p| p.to_string_lossy().replace('\\', "/"))
                            .unwrap_or_default()
                    ),
                    true,
                )
                .with_detail("dir_path", json!(rel_dir));
            }
        }
    }

    // Runtime smoke import is a nice-to-have signal only; its failure
    // never fails verification on its own.
    let package = rel_dir.trim_end_matches('/').replace('/', ".");
    if !package.is_empty() {
        let cmd = format!("python -c \"import {package}\"");
        if let Some(outcome) = run_validation_command(dispatcher, ctx, &cmd, false, 30).await {
            if outcome.failed() {
                warnings.push(format!("smoke import of '{package}' failed"));
            } else {
                result = result.with_detail("smoke_import", json!("ok"));
            }
        }
    }

    if !warnings.is_empty() {
        result = result.with_detail("warnings", json!(warnings));
    }
    result
}

fn python_modules(dir: &Path) -> Vec<PathBuf> {
    let mut modules: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "py"))
                .collect()
        })
        .unwrap_or_default();
    modules.sort();
    modules
}

/// Target-directory resolution priority: result payload keys, last tool
/// call args, tool-event args, description paths.
fn resolve_target_directory(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> Option<PathBuf> {
    if let Some(payload) = parse_task_result_payload(task) {
        if let Some(dir) = payload.get("package_dir").and_then(Value::as_str) {
            if let Ok(resolved) = workspace.resolve(dir, "verify") {
                return Some(resolved.abs_path);
            }
        }
        if let Some(init) = payload.get("package_init").and_then(Value::as_str) {
            if let Ok(resolved) = workspace.resolve(init, "verify") {
                return resolved.abs_path.parent().map(Path::to_path_buf);
            }
        }
    }

    if let Some(last) = ctx.last_tool_call(task.id) {
        if let Some(dir) = last.args.get("target_directory").and_then(Value::as_str) {
            if let Ok(resolved) = workspace.resolve(dir, "verify") {
                return Some(resolved.abs_path);
            }
        }
    }

    for event in task.tool_events.iter().rev() {
        if let Some(dir) = event.args.get("target_directory").and_then(Value::as_str) {
            if let Ok(resolved) = workspace.resolve(dir, "verify") {
                return Some(resolved.abs_path);
            }
        }
    }

    // Description: a .py source implies a package directory of its stem.
    for token in DESC_PY.find_iter(&task.description) {
        let stem_dir = token.as_str().trim_end_matches(".py");
        if let Ok(resolved) = workspace.resolve(stem_dir, "verify") {
            if resolved.abs_path.is_dir() {
                return Some(resolved.abs_path);
            }
        }
    }
    for token in task.description.split_whitespace().filter(|t| t.contains('/')) {
        let token = token.trim_matches(['"', '\'', '.', ',', '`']);
        if token.ends_with(".py") {
            continue;
        }
        if let Ok(resolved) = workspace.resolve(token, "verify") {
            if resolved.abs_path.is_dir() {
                return Some(resolved.abs_path);
            }
        }
    }
    None
}

/// The original single-file module: sibling `<dir>.py` of the package
/// directory, or the split tool's `path` argument.
fn original_source_path(task: &Task, target_dir: &Path, workspace: &Workspace) -> Option<PathBuf> {
    for event in task.tool_events.iter().rev() {
        if event.tool.eq_ignore_ascii_case("split_python_module_classes") {
            if let Some(raw) = event.args.get("path").and_then(Value::as_str) {
                if let Ok(resolved) = workspace.resolve(raw, "verify") {
                    return Some(resolved.abs_path);
                }
            }
        }
    }
    let sibling = target_dir.with_extension("py");
    sibling.parent().is_some().then_some(sibling)
}

fn source_left_intentionally(task: &Task) -> bool {
    let mut haystacks: Vec<String> = Vec::new();
    if let Some(result) = &task.result {
        haystacks.push(result.to_lowercase());
    }
    for event in &task.tool_events {
        if let Some(raw) = &event.raw_result {
            haystacks.push(raw.to_lowercase());
        }
    }
    haystacks.iter().any(|h| h.contains(SOURCE_LEFT_MARKER))
}

#[cfg(test)]
#[path = "refactor_tests.rs"]
mod tests;
