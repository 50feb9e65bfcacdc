use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use rev_core::action::ActionKind;
use rev_core::task::Task;

static ACTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*\[(.*?)\]\s*(.*)$").unwrap());

/// `GOAL_ACHIEVED`, tolerating case and surrounding punctuation.
pub fn is_goal_achieved(reply: &str) -> bool {
    let cleaned: String = reply
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_uppercase();
    cleaned == "GOAL_ACHIEVED" || cleaned == "GOAL ACHIEVED"
}

/// Parse a `[ACTION_TYPE] description` reply into a task. A reply that
/// does not follow the format becomes a `general` task carrying the raw
/// text, so the loop can still make progress.
pub fn parse_action_line(reply: &str) -> Option<Task> {
    let trimmed = reply.trim();
    if trimmed.is_empty() || is_goal_achieved(trimmed) {
        return None;
    }
    if let Some(caps) = ACTION_LINE.captures(trimmed) {
        let action = ActionKind::normalize(&caps[1]);
        let description = caps[2].trim().lines().next().unwrap_or("").trim().to_string();
        if !description.is_empty() {
            return Some(Task::new(action, description));
        }
    }
    Some(Task::new(ActionKind::General, trimmed.lines().next().unwrap_or(trimmed).trim()))
}

/// Parse a planner reply into `(action, description, complexity)` triples.
///
/// Accepts a bare JSON array or one embedded in surrounding prose/fences;
/// tolerates `action` vs `action_type` and missing complexity.
pub fn parse_task_array(reply: &str) -> Option<Vec<(ActionKind, String, Option<String>)>> {
    let json = extract_json_array(reply)?;
    let array = json.as_array()?;
    let mut out = Vec::new();
    for item in array {
        let obj = item.as_object()?;
        let description = obj
            .get("description")
            .or_else(|| obj.get("task"))
            .and_then(Value::as_str)?
            .trim()
            .to_string();
        if description.is_empty() {
            continue;
        }
        let action = obj
            .get("action")
            .or_else(|| obj.get("action_type"))
            .and_then(Value::as_str)
            .map(ActionKind::normalize)
            .unwrap_or(ActionKind::General);
        let complexity = obj
            .get("complexity")
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase());
        out.push((action, description, complexity));
    }
    if out.is_empty() { None } else { Some(out) }
}

fn extract_json_array(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_array() {
            return Some(value);
        }
    }
    // Fall back to the outermost [...] span.
    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_array)
}

/// Order the advertised action vocabulary read-first: read-only actions,
/// then mutating, then execution, advanced tooling and legacy shims last.
pub fn order_available_actions(actions: &[ActionKind]) -> Vec<ActionKind> {
    let priority = |a: &ActionKind| -> i32 {
        match a {
            ActionKind::Read => 0,
            ActionKind::Analyze => 1,
            ActionKind::Review => 2,
            ActionKind::Research | ActionKind::Investigate => 3,
            ActionKind::CreateDirectory => 10,
            ActionKind::Add => 11,
            ActionKind::Create => 11,
            ActionKind::Edit => 12,
            ActionKind::Refactor => 13,
            ActionKind::Delete => 14,
            ActionKind::Rename => 15,
            ActionKind::Fix => 16,
            ActionKind::Doc => 20,
            ActionKind::Test => 30,
            ActionKind::Tool | ActionKind::Run => 41,
            ActionKind::General => 90,
        }
    };

    let mut seen = Vec::new();
    for action in actions {
        if !seen.contains(action) {
            seen.push(*action);
        }
    }
    let mut indexed: Vec<(usize, ActionKind)> = seen.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| priority(a).cmp(&priority(b)).then(ia.cmp(ib)));
    indexed.into_iter().map(|(_, a)| a).collect()
}
