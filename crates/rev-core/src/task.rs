use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::action::ActionKind;
use crate::plan::RiskLevel;

/// Stable task identifier (ULID).
pub type TaskId = Ulid;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TaskStateError {
    #[error("Invalid task transition {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task is COMPLETED; completed tasks are terminal")]
    CompletedIsTerminal,
}

/// Task lifecycle states.
///
/// COMPLETED is terminal by construction; only FAILED and STOPPED are
/// recoverable (retry / resume).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    /// Validate a proposed transition against the closed transition table.
    pub fn validate_transition(self, to: TaskStatus) -> Result<(), TaskStateError> {
        use TaskStatus::*;
        let ok = matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Stopped)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Stopped)
                | (Failed, InProgress)
                | (Stopped, Pending)
        );
        if ok {
            return Ok(());
        }
        if self == Completed {
            return Err(TaskStateError::CompletedIsTerminal);
        }
        Err(TaskStateError::InvalidTransition { from: self, to })
    }

    pub fn is_terminal(self) -> bool {
        self == TaskStatus::Completed
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

/// One recorded status transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One tool invocation recorded on a task. Append-only; never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolEvent {
    pub tool: String,
    pub args: serde_json::Value,
    pub raw_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ToolEvent {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
            raw_result: None,
            artifact_ref: None,
            summary: None,
        }
    }

    pub fn with_result(mut self, raw: impl Into<String>) -> Self {
        self.raw_result = Some(raw.into());
        self
    }
}

/// A declarative validation step attached to a task (parsed out of
/// planner hints such as "Validation: pytest -q tests/").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub label: String,
    pub command: String,
}

/// A single unit of work the orchestrator schedules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub action: ActionKind,
    pub description: String,
    status: TaskStatus,
    pub error: Option<String>,
    /// Tool output or structured sub-agent report, JSON-serialized.
    pub result: Option<String>,
    pub tool_events: Vec<ToolEvent>,
    pub validation_steps: Vec<ValidationStep>,
    pub risk: RiskLevel,
    pub rollback_plan: Option<String>,
    pub transitions: Vec<Transition>,
}

impl Task {
    pub fn new(action: ActionKind, description: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            action,
            description: description.into(),
            status: TaskStatus::Pending,
            error: None,
            result: None,
            tool_events: Vec::new(),
            validation_steps: Vec::new(),
            risk: RiskLevel::Low,
            rollback_plan: None,
            transitions: Vec::new(),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Transition to `new`, recording the transition with an optional reason.
    pub fn set_status(
        &mut self,
        new: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), TaskStateError> {
        self.status.validate_transition(new)?;
        self.transitions.push(Transition {
            from: self.status,
            to: new,
            at: Utc::now(),
            reason: reason.map(str::to_string),
        });
        self.status = new;
        Ok(())
    }

    /// Append a tool event. Events are strictly append-only.
    pub fn record_tool_event(&mut self, event: ToolEvent) {
        self.tool_events.push(event);
    }

    /// True when any recorded tool event names a tool in `writing_tools`.
    pub fn has_writing_event(&self, writing_tools: &[&str]) -> bool {
        self.tool_events
            .iter()
            .any(|ev| writing_tools.iter().any(|w| ev.tool.eq_ignore_ascii_case(w)))
    }
}
