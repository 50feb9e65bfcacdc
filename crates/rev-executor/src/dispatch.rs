use std::sync::LazyLock;

use regex::Regex;

use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::task::{Task, TaskStatus, ToolEvent};
use rev_llm::extract_tool_call_from_text;
use rev_tools::Dispatcher;

use crate::output::{AgentOutcome, SubAgentOutput, FINAL_FAILURE, RECOVERY_REQUESTED, USER_REJECTED};
use crate::registry::AgentRegistry;

static PY_FILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.py\b").unwrap());
static DIRECTORY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)directory\s+([^\s'\x22]+)").unwrap());
static PATHISH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_.][A-Za-z0-9_./-]*").unwrap());

/// Routes one task to the agent bound to its action kind and folds the
/// agent's outcome into task state.
pub struct Executor {
    registry: AgentRegistry,
}

impl Executor {
    pub fn new(registry: AgentRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Dispatch `task`. On return the task is COMPLETED, FAILED, or
    /// STOPPED; the bool mirrors "completed".
    #[tracing::instrument(skip_all, fields(task = %task.id, action = %task.action))]
    pub async fn dispatch(
        &self,
        task: &mut Task,
        ctx: &mut ExecutionContext,
        dispatcher: &Dispatcher,
    ) -> bool {
        // A "create_directory" that names a .py file is a file creation
        // the planner mislabeled (common in decomposed tasks).
        if task.action == ActionKind::CreateDirectory && PY_FILE.is_match(&task.description) {
            task.action = ActionKind::Add;
        }

        // Idempotence fast path: creating a directory that already exists
        // completes immediately with a skipped payload.
        if task.action == ActionKind::CreateDirectory {
            if let Some(payload) = existing_directory_payload(task, dispatcher) {
                if task.set_status(TaskStatus::InProgress, None).is_ok()
                    && task
                        .set_status(TaskStatus::Completed, Some("directory already exists"))
                        .is_ok()
                {
                    task.result = Some(payload);
                    return true;
                }
            }
        }

        let Some(agent) = self.registry.get(task.action) else {
            let message = format!("No agent available to handle action type: '{}'", task.action);
            fail(task, &message);
            return false;
        };

        if task.set_status(TaskStatus::InProgress, None).is_err() {
            fail(task, "task was not in a dispatchable state");
            return false;
        }

        let outcome = match agent.execute(task, ctx, dispatcher).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let message = format!("Sub-agent execution exception: {error:#}");
                task.error = Some(message.clone());
                let _ = task.set_status(TaskStatus::Failed, Some(&message));
                ctx.add_error(format!("Task {}: {message}", task.id));
                return false;
            }
        };

        let outcome = self
            .recover_text_tool_call(outcome, &agent.allowed_tools(), task, ctx, dispatcher)
            .await;

        match outcome {
            AgentOutcome::Structured(output) => {
                append_evidence(task, &output);
                task.result = Some(output.to_json());
                let _ = task.set_status(TaskStatus::Completed, None);
                true
            }
            AgentOutcome::Text(text) => self.finish_text_outcome(task, ctx, text),
        }
    }

    /// If an agent returned a tool call as plain text, execute it here and
    /// rewrap as structured output. This prevents death spirals where the
    /// model can describe a call but fails to emit it structurally.
    async fn recover_text_tool_call(
        &self,
        outcome: AgentOutcome,
        allowed_tools: &[String],
        task: &Task,
        ctx: &mut ExecutionContext,
        dispatcher: &Dispatcher,
    ) -> AgentOutcome {
        let AgentOutcome::Text(text) = &outcome else {
            return outcome;
        };
        if is_sentinel(text) {
            return outcome;
        }
        let Some((tool_name, tool_args)) = extract_tool_call_from_text(text) else {
            return outcome;
        };
        if !allowed_tools.iter().any(|t| t == &tool_name) {
            return outcome;
        }

        tracing::info!(tool = %tool_name, "recovered tool call from text output");
        let tool_output = dispatcher
            .execute(&tool_name, tool_args.clone(), ctx, Some(task.id))
            .await;
        AgentOutcome::Structured(SubAgentOutput {
            agent_name: "text-recovery".into(),
            tool_name,
            tool_args,
            tool_output,
            evidence: Vec::new(),
        })
    }

    fn finish_text_outcome(&self, task: &mut Task, ctx: &mut ExecutionContext, text: String) -> bool {
        if let Some(rest) = text.strip_prefix(RECOVERY_REQUESTED) {
            fail(task, rest.trim());
            return false;
        }
        if let Some(rest) = text.strip_prefix(FINAL_FAILURE) {
            fail(task, rest.trim());
            ctx.add_error(format!("Task {}: {}", task.id, rest.trim()));
            return false;
        }
        if let Some(rest) = text.strip_prefix(USER_REJECTED) {
            task.error = Some(rest.trim().to_string());
            let _ = task.set_status(TaskStatus::Stopped, Some("user rejected"));
            return false;
        }

        // Free-form prose: acceptable for read-like work; the verifier
        // will fail mutating tasks that produced no writing tool event.
        task.result = Some(text);
        let _ = task.set_status(TaskStatus::Completed, None);
        true
    }
}

fn fail(task: &mut Task, message: &str) {
    task.error = Some(message.to_string());
    if task.status() == TaskStatus::Pending {
        let _ = task.set_status(TaskStatus::InProgress, None);
    }
    let _ = task.set_status(TaskStatus::Failed, Some(message));
}

fn is_sentinel(text: &str) -> bool {
    text.starts_with(RECOVERY_REQUESTED)
        || text.starts_with(FINAL_FAILURE)
        || text.starts_with(USER_REJECTED)
}

/// Copy tool evidence from structured output onto the task's events.
fn append_evidence(task: &mut Task, output: &SubAgentOutput) {
    let args = if output.tool_args.is_object() {
        output.tool_args.clone()
    } else {
        serde_json::json!({ "args": output.tool_args })
    };
    let mut event = ToolEvent::new(output.tool_name.clone(), args).with_result(output.tool_output.clone());
    if let Some(first) = output.evidence.first() {
        event.artifact_ref = first.artifact_ref.clone();
        event.summary = first.summary.clone();
    }
    task.record_tool_event(event);
}

/// For a create_directory task whose target already exists, build the
/// skipped-completion payload.
fn existing_directory_payload(task: &Task, dispatcher: &Dispatcher) -> Option<String> {
    let description = &task.description;
    let candidate = DIRECTORY_TOKEN
        .captures(description)
        .map(|c| c[1].to_string())
        .or_else(|| {
            PATHISH_TOKEN
                .find_iter(description)
                .map(|m| m.as_str())
                .find(|t| t.contains('/'))
                .map(str::to_string)
        })?;
    let candidate = candidate.trim_matches(['"', '\'', '.', ',']).to_string();
    let resolved = dispatcher
        .workspace()
        .resolve(&candidate, "create_directory preflight")
        .ok()?;
    if !resolved.abs_path.is_dir() {
        return None;
    }
    Some(
        serde_json::json!({
            "skipped": true,
            "reason": "directory already exists",
            "directory_abs": resolved.abs_path.to_string_lossy(),
            "directory_rel": resolved.rel_path,
        })
        .to_string(),
    )
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
