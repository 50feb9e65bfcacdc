use async_trait::async_trait;

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_llm::{ChatClient, ChatMessage, ToolSchema};
use rev_tools::Dispatcher;

use crate::output::{AgentOutcome, SubAgentOutput};
use crate::SubAgent;

/// Generic chat-driven sub-agent: asks the model to perform the task with
/// one tool call from its allowlist, executes it, and returns structured
/// output. Bound to multiple action kinds with different allowlists.
pub struct ChatToolAgent {
    name: String,
    chat: std::sync::Arc<dyn ChatClient>,
    allowed_tools: Vec<String>,
    /// At most this many tool calls per task.
    max_tool_calls: u32,
}

impl ChatToolAgent {
    pub fn new(
        name: impl Into<String>,
        chat: std::sync::Arc<dyn ChatClient>,
        allowed_tools: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            chat,
            allowed_tools,
            max_tool_calls: 4,
        }
    }

    fn tool_schemas(&self, dispatcher: &Dispatcher) -> Vec<ToolSchema> {
        dispatcher
            .registry()
            .schemas()
            .into_iter()
            .filter(|(name, _, _)| self.allowed_tools.iter().any(|t| t == name))
            .map(|(name, description, parameters)| ToolSchema {
                name,
                description,
                parameters,
            })
            .collect()
    }
}

#[async_trait]
impl SubAgent for ChatToolAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_tools(&self) -> Vec<String> {
        self.allowed_tools.clone()
    }

    async fn execute(
        &self,
        task: &Task,
        ctx: &mut ExecutionContext,
        dispatcher: &Dispatcher,
    ) -> anyhow::Result<AgentOutcome> {
        let schemas = self.tool_schemas(dispatcher);
        let mut messages = vec![
            ChatMessage::system(format!(
                "You are the {} agent. Perform the task using the provided tools. \
                 Call exactly one tool per turn. When the task is done, reply with a short \
                 plain-text summary instead of a tool call.",
                self.name
            )),
            ChatMessage::user(format!(
                "Task ({action}): {description}\n\nRequest context: {request}",
                action = task.action,
                description = task.description,
                request = ctx.user_request,
            )),
        ];

        let mut last_output: Option<SubAgentOutput> = None;
        for _round in 0..self.max_tool_calls {
            let reply = self.chat.chat(&messages, Some(schemas.as_slice())).await?;

            let Some(call) = reply.tool_calls.first().cloned() else {
                // No tool call: either we already have evidence, or the
                // model answered in prose (the dispatcher's text-recovery
                // path handles embedded calls).
                return Ok(match last_output {
                    Some(output) => AgentOutcome::Structured(output),
                    None => AgentOutcome::Text(reply.content),
                });
            };

            if !self.allowed_tools.iter().any(|t| t == &call.name) {
                messages.push(ChatMessage::tool(format!(
                    "{}: {{\"error\": \"tool not in this agent's allowlist\"}}",
                    call.name
                )));
                continue;
            }

            let tool_output = dispatcher
                .execute(&call.name, call.arguments.clone(), ctx, Some(task.id))
                .await;
            messages.push(ChatMessage::assistant(reply.content.clone()));
            messages.push(ChatMessage::tool(format!("{}: {tool_output}", call.name)));
            last_output = Some(SubAgentOutput {
                agent_name: self.name.clone(),
                tool_name: call.name,
                tool_args: call.arguments,
                tool_output,
                evidence: Vec::new(),
            });
        }

        Ok(match last_output {
            Some(output) => AgentOutcome::Structured(output),
            None => AgentOutcome::Text(String::new()),
        })
    }
}
