use serde_json::Value;

use rev_core::task::Task;
use rev_tools::{is_read_only_tool, is_write_tool};

/// Per-tool "made no change" signatures. Returns a reason string with a
/// targeted recovery hint when the tool reports a no-op.
pub fn extract_tool_noop(tool: &str, raw_result: Option<&str>) -> Option<String> {
    let tool = tool.to_lowercase();
    let raw = raw_result?.trim();
    if raw.is_empty() {
        return None;
    }
    let payload: Value = serde_json::from_str(raw).ok()?;
    let payload = payload.as_object()?;

    match tool.as_str() {
        "replace_in_file" => {
            if payload.get("replaced").and_then(Value::as_i64) == Some(0) {
                return Some(
                    "tool_noop: replace_in_file made no changes (replaced=0). \
                     RECOVERY: Check whitespace, indentation, and surrounding context; \
                     read the file again before retrying the replacement."
                        .to_string(),
                );
            }
        }
        "apply_patch" => {
            if payload.get("applied_hunks").and_then(Value::as_i64) == Some(0) {
                return Some(
                    "tool_noop: apply_patch applied 0 hunks. \
                     RECOVERY: The diff is stale or targets the wrong lines; regenerate it \
                     from the current file content."
                        .to_string(),
                );
            }
        }
        "split_python_module_classes" => {
            if payload.get("classes_split").and_then(Value::as_i64) == Some(0) {
                return Some(
                    "tool_noop: split_python_module_classes found 0 classes to split. \
                     RECOVERY: Verify the source path and that it defines top-level classes."
                        .to_string(),
                );
            }
        }
        "search_code" | "rag_search" => {
            let results = payload.get("matches").or_else(|| payload.get("results"));
            if results.and_then(Value::as_array).is_some_and(|a| a.is_empty()) {
                return Some(format!(
                    "tool_noop: {tool} returned 0 results. RECOVERY: Broaden the search \
                     pattern or check for typos in file names/symbols."
                ));
            }
        }
        "run_tests" => {
            let stdout = payload
                .get("stdout")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            if stdout.contains("collected 0 items")
                || stdout.contains("no tests ran")
                || stdout.contains("no tests found")
            {
                return Some(
                    "tool_noop: run_tests found 0 tests to run. \
                     RECOVERY: Check the test path or test discovery patterns."
                        .to_string(),
                );
            }
        }
        _ => {
            if (tool.starts_with("rename_") || tool.starts_with("move_") || tool.starts_with("rewrite_"))
                && (payload.get("changed").and_then(Value::as_i64) == Some(0)
                    || payload.get("replaced").and_then(Value::as_i64) == Some(0))
            {
                return Some(format!("tool_noop: {tool} made 0 changes."));
            }
        }
    }
    None
}

/// True if the task ran tools but only read-only ones.
pub fn task_executed_only_reads(task: &Task) -> bool {
    if task.tool_events.is_empty() {
        return false;
    }
    let mut saw_any = false;
    for event in &task.tool_events {
        if is_write_tool(&event.tool) {
            return false;
        }
        if is_read_only_tool(&event.tool) {
            saw_any = true;
        }
    }
    saw_any
}
