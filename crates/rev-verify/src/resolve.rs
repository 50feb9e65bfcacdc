use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_workspace::Workspace;

static DESC_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]+\.(?:py|pyi|js|jsx|ts|tsx|vue|mjs|cjs|go|rs|rb|java|json|toml|yaml|yml|md)\b")
        .unwrap()
});

/// Parse a task result string as a JSON object. Tolerates sub-agent
/// output wrappers by preferring the inner `tool_output` when it parses
/// as an object.
pub fn parse_task_result_payload(task: &Task) -> Option<Map<String, Value>> {
    let raw = task.result.as_deref()?.trim();
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;

    if let Some(inner) = obj.get("tool_output") {
        let inner_value = match inner {
            Value::String(s) => serde_json::from_str::<Value>(s).ok(),
            Value::Object(_) => Some(inner.clone()),
            _ => None,
        };
        if let Some(Value::Object(map)) = inner_value {
            return Some(map);
        }
    }
    Some(obj.clone())
}

/// Pull a path out of a JSON object using the stable result keys.
fn path_from_object(obj: &Map<String, Value>) -> Option<String> {
    for key in ["path_abs", "path_rel", "path", "file_path", "dir_path", "target_directory"] {
        if let Some(path) = obj.get(key).and_then(Value::as_str) {
            if !path.trim().is_empty() {
                return Some(path.trim().to_string());
            }
        }
    }
    None
}

/// Resolve the file a task operated on, in priority order: tool events
/// (latest first), the dispatcher's last-tool-call record, the task
/// result payload, and finally path tokens in the description.
pub fn resolve_task_target(
    task: &Task,
    ctx: &ExecutionContext,
    workspace: &Workspace,
) -> Option<PathBuf> {
    for event in task.tool_events.iter().rev() {
        if let Some(obj) = event.args.as_object() {
            if let Some(path) = path_from_object(obj) {
                if let Ok(resolved) = workspace.resolve(&path, "verify") {
                    return Some(resolved.abs_path);
                }
            }
        }
        if let Some(raw) = &event.raw_result {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
                if let Some(path) = path_from_object(&obj) {
                    if let Ok(resolved) = workspace.resolve(&path, "verify") {
                        return Some(resolved.abs_path);
                    }
                }
            }
        }
    }

    if let Some(last) = ctx.last_tool_call(task.id) {
        if let Some(obj) = last.args.as_object() {
            if let Some(path) = path_from_object(obj) {
                if let Ok(resolved) = workspace.resolve(&path, "verify") {
                    return Some(resolved.abs_path);
                }
            }
        }
    }

    if let Some(payload) = parse_task_result_payload(task) {
        if let Some(path) = path_from_object(&payload) {
            if let Ok(resolved) = workspace.resolve(&path, "verify") {
                return Some(resolved.abs_path);
            }
        }
    }

    for token in DESC_PATH.find_iter(&task.description) {
        if let Ok(resolved) = workspace.resolve(token.as_str(), "verify") {
            return Some(resolved.abs_path);
        }
    }
    None
}

/// All path tokens in a description, resolved against the workspace.
pub fn description_paths(description: &str, workspace: &Workspace) -> Vec<PathBuf> {
    DESC_PATH
        .find_iter(description)
        .filter_map(|token| workspace.resolve(token.as_str(), "verify").ok())
        .map(|resolved| resolved.abs_path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rev_core::action::ActionKind;
    use rev_core::task::ToolEvent;
    use serde_json::json;

    fn fixture() -> (Workspace, ExecutionContext) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::mem::forget(dir);
        (Workspace::new(root.clone()), ExecutionContext::new("r", root))
    }

    #[test]
    fn test_priority_tool_events_first() {
        let (ws, mut ctx) = fixture();
        let mut task = Task::new(ActionKind::Edit, "edit lib/other.py");
        task.record_tool_event(ToolEvent::new("write_file", json!({"path": "lib/from_event.py"})));
        ctx.set_last_tool_call(task.id, "write_file", json!({"path": "lib/from_last_call.py"}));

        let target = resolve_task_target(&task, &ctx, &ws).unwrap();
        assert!(target.ends_with("lib/from_event.py"));
    }

    #[test]
    fn test_falls_back_to_last_tool_call_then_result_then_description() {
        let (ws, mut ctx) = fixture();
        let mut task = Task::new(ActionKind::Edit, "edit lib/from_desc.py");

        let target = resolve_task_target(&task, &ctx, &ws).unwrap();
        assert!(target.ends_with("lib/from_desc.py"));

        task.result = Some(json!({"path_rel": "lib/from_result.py"}).to_string());
        let target = resolve_task_target(&task, &ctx, &ws).unwrap();
        assert!(target.ends_with("lib/from_result.py"));

        ctx.set_last_tool_call(task.id, "write_file", json!({"path": "lib/from_last.py"}));
        let target = resolve_task_target(&task, &ctx, &ws).unwrap();
        assert!(target.ends_with("lib/from_last.py"));
    }

    #[test]
    fn test_subagent_wrapper_tool_output_is_preferred() {
        let (_ws, _ctx) = fixture();
        let mut task = Task::new(ActionKind::Edit, "x");
        task.result = Some(
            json!({
                "agent_name": "edit",
                "tool_name": "write_file",
                "tool_output": "{\"path_rel\": \"lib/a.py\", \"rc\": 0}"
            })
            .to_string(),
        );
        let payload = parse_task_result_payload(&task).unwrap();
        assert_eq!(payload.get("path_rel").unwrap(), "lib/a.py");
    }

    #[test]
    fn test_no_path_anywhere_is_none() {
        let (ws, ctx) = fixture();
        let task = Task::new(ActionKind::Edit, "improve things generally");
        assert!(resolve_task_target(&task, &ctx, &ws).is_none());
    }

    #[test]
    fn test_description_paths() {
        let (ws, _ctx) = fixture();
        let paths = description_paths("edit lib/a.py and tests/test_a.py", &ws);
        assert_eq!(paths.len(), 2);
    }
}
