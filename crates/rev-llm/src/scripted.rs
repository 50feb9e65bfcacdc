use std::sync::Mutex;

use async_trait::async_trait;

use crate::types::{ChatError, ChatMessage, ChatReply, ToolSchema};
use crate::ChatClient;

/// Deterministic `ChatClient` for tests: replays a fixed sequence of
/// replies and records every prompt it was sent.
pub struct ScriptedChat {
    replies: Mutex<std::vec::IntoIter<Result<ChatReply, String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    /// Reply returned when the script runs dry.
    fallback: ChatReply,
}

impl ScriptedChat {
    pub fn new(replies: Vec<ChatReply>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(Ok)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            prompts: Mutex::new(Vec::new()),
            fallback: ChatReply::text("GOAL_ACHIEVED"),
        }
    }

    /// Script from plain strings.
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| ChatReply::text(*t)).collect())
    }

    /// Script including transport errors.
    pub fn with_outcomes(outcomes: Vec<Result<ChatReply, String>>) -> Self {
        Self {
            replies: Mutex::new(outcomes.into_iter()),
            prompts: Mutex::new(Vec::new()),
            fallback: ChatReply::text("GOAL_ACHIEVED"),
        }
    }

    pub fn set_fallback(&mut self, reply: ChatReply) {
        self.fallback = reply;
    }

    /// All prompts seen so far (one entry per chat() call).
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[ToolSchema]>,
    ) -> Result<ChatReply, ChatError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().next() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ChatError::RequestFailed(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
