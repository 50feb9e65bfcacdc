use async_trait::async_trait;

use crate::types::{ChatError, ChatMessage, ChatReply, ToolSchema};
use crate::ChatClient;

/// Placeholder client used when no chat backend is wired in. Every call
/// fails with a configuration hint, so runs degrade at the planning step
/// with a clear message instead of a panic.
#[derive(Debug, Default)]
pub struct NullChat;

#[async_trait]
impl ChatClient for NullChat {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolSchema]>,
    ) -> Result<ChatReply, ChatError> {
        Err(ChatError::RequestFailed(
            "no chat backend configured; embed a ChatClient implementation".to_string(),
        ))
    }

    fn supports_tools(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_chat_always_errors() {
        let err = NullChat
            .chat(&[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no chat backend configured"));
        assert!(!NullChat.supports_tools());
    }
}
