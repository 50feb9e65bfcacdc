use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::error::ToolError;
use rev_core::task::{Task, TaskStatus};
use rev_tools::registry::{Tool, ToolRegistry};
use rev_tools::Dispatcher;
use rev_workspace::Workspace;

use super::*;
use crate::output::{AgentOutcome, Evidence, SubAgentOutput};
use crate::registry::AgentRegistry;
use crate::SubAgent;

struct EchoTool {
    tool_name: &'static str,
    payload: Value,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"path": {"type": "string"}}})
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(self.payload.clone())
    }
}

/// Agent scripted to return a fixed outcome.
struct FixedAgent {
    outcome: AgentOutcome,
    allowed: Vec<String>,
}

#[async_trait]
impl SubAgent for FixedAgent {
    fn name(&self) -> &str {
        "fixed"
    }

    fn allowed_tools(&self) -> Vec<String> {
        self.allowed.clone()
    }

    async fn execute(
        &self,
        _task: &Task,
        _ctx: &mut ExecutionContext,
        _dispatcher: &Dispatcher,
    ) -> anyhow::Result<AgentOutcome> {
        Ok(self.outcome.clone())
    }
}

fn fixture(outcome: AgentOutcome, actions: &[ActionKind]) -> (Executor, Dispatcher, ExecutionContext, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::mem::forget(dir);

    let mut tools = ToolRegistry::new();
    tools.register(EchoTool {
        tool_name: "write_file",
        payload: json!({"written": true}),
    });
    let dispatcher = Dispatcher::new(Arc::new(tools), Workspace::new(root.clone()));

    let mut agents = AgentRegistry::new();
    agents.bind(
        actions,
        Arc::new(FixedAgent {
            outcome,
            allowed: vec!["write_file".into()],
        }),
    );

    let ctx = ExecutionContext::new("request", root.clone());
    (Executor::new(agents), dispatcher, ctx, root)
}

fn structured_output() -> SubAgentOutput {
    SubAgentOutput {
        agent_name: "edit-agent".into(),
        tool_name: "write_file".into(),
        tool_args: json!({"path": "lib/a.py", "content": "x"}),
        tool_output: r#"{"written": true}"#.into(),
        evidence: vec![Evidence {
            artifact_ref: None,
            summary: Some("wrote lib/a.py".into()),
        }],
    }
}

#[tokio::test]
async fn test_structured_outcome_completes_with_evidence() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Structured(structured_output()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;

    assert!(ok);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.tool_events.len(), 1);
    assert_eq!(task.tool_events[0].tool, "write_file");
    assert_eq!(task.tool_events[0].summary.as_deref(), Some("wrote lib/a.py"));
    assert!(task.result.as_deref().unwrap().contains("write_file"));
}

#[tokio::test]
async fn test_recovery_requested_sentinel_fails_task() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text("[RECOVERY_REQUESTED] cannot edit, wrong path".into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;

    assert!(!ok);
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("cannot edit, wrong path"));
}

#[tokio::test]
async fn test_user_rejected_sentinel_stops_task() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text("[USER_REJECTED] declined the change".into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    assert_eq!(task.status(), TaskStatus::Stopped);
}

#[tokio::test]
async fn test_final_failure_records_context_error() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text("[FINAL_FAILURE] unrecoverable".into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert!(ctx.errors.iter().any(|e| e.contains("unrecoverable")));
}

#[tokio::test]
async fn test_text_tool_call_is_recovered_and_executed() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text(r#"{"tool": "write_file", "args": {"path": "lib/a.py", "content": "x"}}"#.into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;

    assert!(ok);
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.tool_events.len(), 1);
    assert!(task.tool_events[0].raw_result.as_deref().unwrap().contains("written"));
    // Recovery executed through the dispatcher, which records the call.
    assert_eq!(ctx.last_tool_call(task.id).unwrap().tool, "write_file");
}

#[tokio::test]
async fn test_text_tool_call_outside_allowlist_not_executed() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text(r#"{"tool": "delete_file", "args": {"path": "lib/a.py"}}"#.into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    // Completed as free-form text; no tool event was recorded.
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.tool_events.is_empty());
}

#[tokio::test]
async fn test_unregistered_action_fails() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Text("x".into()),
        &[ActionKind::Edit],
    );
    let mut task = Task::new(ActionKind::Test, "run tests");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    assert!(!ok);
    assert_eq!(task.status(), TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("No agent available"));
}

#[tokio::test]
async fn test_create_directory_with_py_file_coerces_to_add() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Structured(structured_output()),
        &[ActionKind::Add],
    );
    let mut task = Task::new(ActionKind::CreateDirectory, "create lib/analysts/__init__.py");
    executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    assert_eq!(task.action, ActionKind::Add);
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn test_existing_directory_fast_path() {
    let (executor, dispatcher, mut ctx, root) = fixture(
        AgentOutcome::Text("should not run".into()),
        &[ActionKind::CreateDirectory],
    );
    std::fs::create_dir_all(root.join("lib/analysts")).unwrap();
    let mut task = Task::new(ActionKind::CreateDirectory, "create the directory lib/analysts");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;

    assert!(ok);
    assert_eq!(task.status(), TaskStatus::Completed);
    let payload: Value = serde_json::from_str(task.result.as_deref().unwrap()).unwrap();
    assert_eq!(payload["skipped"], true);
    assert_eq!(payload["directory_rel"], "lib/analysts");
}

#[tokio::test]
async fn test_missing_directory_goes_to_agent() {
    let (executor, dispatcher, mut ctx, _root) = fixture(
        AgentOutcome::Structured(SubAgentOutput {
            agent_name: "fs".into(),
            tool_name: "create_directory".into(),
            tool_args: json!({"path": "lib/analysts"}),
            tool_output: r#"{"created": true}"#.into(),
            evidence: Vec::new(),
        }),
        &[ActionKind::CreateDirectory],
    );
    let mut task = Task::new(ActionKind::CreateDirectory, "create the directory lib/analysts");
    let ok = executor.dispatch(&mut task, &mut ctx, &dispatcher).await;
    assert!(ok);
    assert_eq!(task.tool_events[0].tool, "create_directory");
}
