//! Chat collaborator contract.
//!
//! The orchestrator core never talks to a model transport directly; it
//! consumes this trait. Replies may carry structured tool calls or tool
//! calls embedded in the content string; `extract_tool_call_from_text`
//! tolerates the latter.

pub mod null;
pub mod scripted;
pub mod types;

pub use null::NullChat;
pub use scripted::ScriptedChat;
pub use types::{ChatError, ChatMessage, ChatReply, Role, ToolCall, ToolSchema};

use async_trait::async_trait;

/// One conversational model endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` (optionally advertising `tools`) and await a reply.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatReply, ChatError>;

    /// Whether the endpoint supports structured tool calls at all.
    fn supports_tools(&self) -> bool {
        true
    }
}

/// Best-effort recovery of a tool call described in plain text.
///
/// Accepts either a bare JSON object with `tool`/`name` plus
/// `args`/`arguments`, or a `tool_name({...})` call form. Returns the
/// tool name and its argument object.
pub fn extract_tool_call_from_text(text: &str) -> Option<(String, serde_json::Value)> {
    let trimmed = text.trim();

    // Form 1: a JSON object, possibly fenced.
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    if candidate.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            let name = value
                .get("tool")
                .or_else(|| value.get("name"))
                .or_else(|| value.get("tool_name"))
                .and_then(|v| v.as_str())?;
            let args = value
                .get("args")
                .or_else(|| value.get("arguments"))
                .or_else(|| value.get("tool_args"))
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            if args.is_object() {
                return Some((name.to_string(), args));
            }
            return None;
        }
    }

    // Form 2: tool_name({"path": "..."}).
    let open = trimmed.find('(')?;
    let name = trimmed[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let close = trimmed.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = trimmed[open + 1..close].trim();
    let args: serde_json::Value = if inner.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(inner).ok()?
    };
    if !args.is_object() {
        return None;
    }
    Some((name.to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_object_form() {
        let (name, args) =
            extract_tool_call_from_text(r#"{"tool": "read_file", "args": {"path": "lib/a.py"}}"#)
                .unwrap();
        assert_eq!(name, "read_file");
        assert_eq!(args, json!({"path": "lib/a.py"}));
    }

    #[test]
    fn test_extract_arguments_alias_and_fences() {
        let text = "```json\n{\"name\": \"write_file\", \"arguments\": {\"path\": \"x\", \"content\": \"y\"}}\n```";
        let (name, args) = extract_tool_call_from_text(text).unwrap();
        assert_eq!(name, "write_file");
        assert_eq!(args["content"], "y");
    }

    #[test]
    fn test_extract_call_form() {
        let (name, args) =
            extract_tool_call_from_text(r#"split_python_module_classes({"path": "lib/analysts.py"})"#)
                .unwrap();
        assert_eq!(name, "split_python_module_classes");
        assert_eq!(args["path"], "lib/analysts.py");
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(extract_tool_call_from_text("I will now edit the file.").is_none());
        assert!(extract_tool_call_from_text("").is_none());
        assert!(extract_tool_call_from_text("f(x) = y").is_none());
    }

    #[test]
    fn test_extract_missing_args_defaults_to_empty_object() {
        let (name, args) = extract_tool_call_from_text(r#"{"tool": "list_dir"}"#).unwrap();
        assert_eq!(name, "list_dir");
        assert_eq!(args, json!({}));
    }
}
