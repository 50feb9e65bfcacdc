use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::budget::{RecoveryBudgets, ResourceBudget};
use crate::plan::ExecutionPlan;
use crate::task::TaskId;
use crate::verification::VerificationResult;

/// Structured message from a sub-agent (or guard) back to the orchestrator,
/// read by the loop between iterations and surfaced to the planner as
/// WARNING lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentRequest {
    Replan { reason: String },
    RedundantRead { path: String, count: u32 },
    BudgetExhausted { scope: String },
}

impl AgentRequest {
    /// Render for the continuous-planner prompt.
    pub fn as_warning(&self) -> String {
        match self {
            Self::Replan { reason } => format!("WARNING: REPLAN_REQUEST: {reason}"),
            Self::RedundantRead { path, count } => format!(
                "WARNING: REDUNDANT_FILE_READ: '{path}' was already read {count} times; \
                 do not read it again, act on its content instead"
            ),
            Self::BudgetExhausted { scope } => {
                format!("WARNING: BUDGET_EXHAUSTED: {scope}")
            }
        }
    }
}

/// The last tool invocation the dispatcher observed for a task. Used by
/// the verifier when the agent's returned payload is ambiguous.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LastToolCall {
    pub tool: String,
    pub args: Value,
}

/// Mutable per-request state. Owned exclusively by the orchestrator;
/// agents and tools receive it by borrow and may append to tool events,
/// work history, and agent state, but never set task status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub user_request: String,
    pub workspace_root: PathBuf,
    pub read_only: bool,
    pub plan: Option<ExecutionPlan>,
    pub verification_history: Vec<VerificationResult>,
    pub budget: ResourceBudget,
    pub recovery_budgets: RecoveryBudgets,
    /// Ephemeral counters and flags (last-test iteration, tdd flags,
    /// install-guard mtimes, ...).
    pub agent_state: BTreeMap<String, Value>,
    pub work_history: Vec<String>,
    pub agent_requests: Vec<AgentRequest>,
    pub errors: Vec<String>,
    pub insights: BTreeMap<String, Value>,
    last_tool_calls: BTreeMap<TaskId, LastToolCall>,
    file_read_counts: BTreeMap<String, u32>,
}

impl ExecutionContext {
    pub fn new(user_request: impl Into<String>, workspace_root: PathBuf) -> Self {
        Self {
            user_request: user_request.into(),
            workspace_root,
            read_only: false,
            plan: None,
            verification_history: Vec::new(),
            budget: ResourceBudget::default(),
            recovery_budgets: RecoveryBudgets::default(),
            agent_state: BTreeMap::new(),
            work_history: Vec::new(),
            agent_requests: Vec::new(),
            errors: Vec::new(),
            insights: BTreeMap::new(),
            last_tool_calls: BTreeMap::new(),
            file_read_counts: BTreeMap::new(),
        }
    }

    pub fn set_state(&mut self, key: &str, value: Value) {
        self.agent_state.insert(key.to_string(), value);
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.agent_state.get(key)
    }

    pub fn state_bool(&self, key: &str) -> bool {
        self.state(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn state_i64(&self, key: &str) -> Option<i64> {
        self.state(key).and_then(Value::as_i64)
    }

    pub fn clear_state(&mut self, key: &str) {
        self.agent_state.remove(key);
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn record_work(&mut self, entry: impl Into<String>) {
        self.work_history.push(entry.into());
    }

    /// Last `n` work-history lines, oldest first.
    pub fn recent_work(&self, n: usize) -> &[String] {
        let start = self.work_history.len().saturating_sub(n);
        &self.work_history[start..]
    }

    pub fn push_agent_request(&mut self, request: AgentRequest) {
        self.agent_requests.push(request);
    }

    /// Drain pending agent requests (the loop reads them between iterations).
    pub fn take_agent_requests(&mut self) -> Vec<AgentRequest> {
        std::mem::take(&mut self.agent_requests)
    }

    pub fn set_last_tool_call(&mut self, task: TaskId, tool: &str, args: Value) {
        self.last_tool_calls.insert(
            task,
            LastToolCall {
                tool: tool.to_string(),
                args,
            },
        );
    }

    pub fn last_tool_call(&self, task: TaskId) -> Option<&LastToolCall> {
        self.last_tool_calls.get(&task)
    }

    /// Bump and return the read count for a file (redundant-read guard).
    pub fn note_file_read(&mut self, rel_path: &str) -> u32 {
        let count = self.file_read_counts.entry(rel_path.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn file_read_count(&self, rel_path: &str) -> u32 {
        self.file_read_counts.get(rel_path).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("do things", PathBuf::from("/tmp/ws"))
    }

    #[test]
    fn test_agent_state_round_trip() {
        let mut c = ctx();
        c.set_state("tdd_pending_green", json!(true));
        assert!(c.state_bool("tdd_pending_green"));
        c.clear_state("tdd_pending_green");
        assert!(!c.state_bool("tdd_pending_green"));
    }

    #[test]
    fn test_recent_work_window() {
        let mut c = ctx();
        for i in 0..10 {
            c.record_work(format!("step {i}"));
        }
        let recent = c.recent_work(3);
        assert_eq!(recent, &["step 7", "step 8", "step 9"]);
        assert_eq!(c.recent_work(100).len(), 10);
    }

    #[test]
    fn test_take_agent_requests_drains() {
        let mut c = ctx();
        c.push_agent_request(AgentRequest::Replan {
            reason: "stale plan".into(),
        });
        assert_eq!(c.take_agent_requests().len(), 1);
        assert!(c.take_agent_requests().is_empty());
    }

    #[test]
    fn test_agent_request_warning_format() {
        let warn = AgentRequest::RedundantRead {
            path: "lib/a.py".into(),
            count: 5,
        }
        .as_warning();
        assert!(warn.contains("REDUNDANT_FILE_READ"));
        assert!(warn.contains("lib/a.py"));
    }

    #[test]
    fn test_file_read_counter() {
        let mut c = ctx();
        assert_eq!(c.note_file_read("lib/a.py"), 1);
        assert_eq!(c.note_file_read("lib/a.py"), 2);
        assert_eq!(c.file_read_count("lib/a.py"), 2);
        assert_eq!(c.file_read_count("lib/b.py"), 0);
    }

    #[test]
    fn test_last_tool_call_keyed_by_task() {
        let mut c = ctx();
        let id = ulid::Ulid::new();
        c.set_last_tool_call(id, "write_file", json!({"path": "a.py"}));
        assert_eq!(c.last_tool_call(id).unwrap().tool, "write_file");
        assert!(c.last_tool_call(ulid::Ulid::new()).is_none());
    }
}
