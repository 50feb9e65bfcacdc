use std::path::Path;

use serde_json::{json, Value};

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_core::verification::VerificationResult;
use rev_workspace::Workspace;

use crate::resolve::{description_paths, parse_task_result_payload, resolve_task_target};

pub const NO_TARGET_MESSAGE: &str = "Could not determine file path to verify";

fn rel(path: &Path, workspace: &Workspace) -> String {
    path.strip_prefix(workspace.root())
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

/// `add`/`create`: the target must exist and be non-empty afterwards.
pub fn verify_file_creation(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> VerificationResult {
    let Some(target) = resolve_task_target(task, ctx, workspace) else {
        return VerificationResult::fail(NO_TARGET_MESSAGE, true);
    };
    let rel_path = rel(&target, workspace);

    if !target.exists() {
        return VerificationResult::fail(
            format!("File was not created: {rel_path}"),
            true,
        )
        .with_detail("file_path", json!(rel_path));
    }
    if target.is_file() && target.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        return VerificationResult::fail(
            format!("File created but is empty: {rel_path}"),
            true,
        )
        .with_detail("file_path", json!(rel_path));
    }
    VerificationResult::pass(format!("File created: {rel_path}"))
        .with_detail("file_path", json!(rel_path))
}

/// `edit`: the file must exist after the task. Content-diff verification
/// belongs to the declarative validation layer, not here.
pub fn verify_file_edit(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> VerificationResult {
    let Some(target) = resolve_task_target(task, ctx, workspace) else {
        return VerificationResult::fail(NO_TARGET_MESSAGE, true);
    };
    let rel_path = rel(&target, workspace);
    if !target.exists() {
        return VerificationResult::fail(
            format!("Edited file not found: {rel_path}"),
            true,
        )
        .with_detail("file_path", json!(rel_path));
    }
    VerificationResult::pass(format!("File edited: {rel_path}"))
        .with_detail("file_path", json!(rel_path))
}

/// `create_directory`: the directory must exist. A `skipped` payload
/// (directory already existed) passes as-is.
pub fn verify_directory_creation(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> VerificationResult {
    if let Some(payload) = parse_task_result_payload(task) {
        if payload.get("skipped").and_then(Value::as_bool) == Some(true) {
            return VerificationResult::pass("Directory already existed (skipped)")
                .with_detail("skipped", json!(true));
        }
        for key in ["dir_path", "directory_rel", "directory_abs", "path_rel", "path_abs"] {
            if let Some(raw) = payload.get(key).and_then(Value::as_str) {
                if let Ok(resolved) = workspace.resolve(raw, "verify") {
                    return directory_result(&resolved.abs_path, workspace);
                }
            }
        }
    }
    if let Some(target) = resolve_task_target(task, ctx, workspace) {
        return directory_result(&target, workspace);
    }
    // Directory names rarely carry extensions; fall back to path-ish
    // description tokens with a slash.
    for token in task.description.split_whitespace().filter(|t| t.contains('/')) {
        let token = token.trim_matches(['"', '\'', '.', ',', '`']);
        if let Ok(resolved) = workspace.resolve(token, "verify") {
            return directory_result(&resolved.abs_path, workspace);
        }
    }
    VerificationResult::fail("Could not determine directory path to verify", true)
}

fn directory_result(path: &Path, workspace: &Workspace) -> VerificationResult {
    let rel_path = rel(path, workspace);
    if path.is_dir() {
        VerificationResult::pass(format!("Directory exists: {rel_path}"))
            .with_detail("dir_path", json!(rel_path))
    } else {
        VerificationResult::fail(format!("Directory was not created: {rel_path}"), true)
            .with_detail("dir_path", json!(rel_path))
    }
}

/// Read-like actions: pass iff the task actually ran at least one tool.
pub fn verify_read_task(task: &Task) -> VerificationResult {
    if task.tool_events.is_empty() {
        return VerificationResult::fail(
            "Read task recorded no tool calls; nothing was actually inspected",
            true,
        );
    }
    VerificationResult::pass(format!(
        "Read task ran {} tool call(s)",
        task.tool_events.len()
    ))
}

/// Paths touched by a task, for strict checks: tool-event paths first,
/// then description tokens.
pub fn touched_paths(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();
    for event in &task.tool_events {
        if let Some(raw) = event.args.get("path").and_then(Value::as_str) {
            if let Ok(resolved) = workspace.resolve(raw, "verify") {
                paths.push(resolved.abs_path);
            }
        }
    }
    if paths.is_empty() {
        if let Some(target) = resolve_task_target(task, ctx, workspace) {
            paths.push(target);
        }
    }
    if paths.is_empty() {
        paths = description_paths(&task.description, workspace);
    }
    paths.dedup();
    paths
}
