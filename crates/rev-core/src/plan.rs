use serde::{Deserialize, Serialize};

use crate::goal::Goal;
use crate::task::{Task, TaskId, TaskStateError, TaskStatus};

#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("Task {0} not found in plan")]
    TaskNotFound(TaskId),

    #[error("Task {id} is {actual}, expected {expected}")]
    WrongStatus {
        id: TaskId,
        actual: TaskStatus,
        expected: TaskStatus,
    },

    #[error(transparent)]
    State(#[from] TaskStateError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

const SECURITY_KEYWORDS: &[&str] = &["auth", "password", "secret", "token", "crypt", "credential"];

/// Derive a task's risk from its action and description.
pub fn derive_risk(task: &Task) -> RiskLevel {
    if !task.action.is_mutating() {
        return RiskLevel::Low;
    }
    let desc = task.description.to_lowercase();
    let security_sensitive = SECURITY_KEYWORDS.iter().any(|k| desc.contains(k));
    let destructive = matches!(
        task.action,
        crate::action::ActionKind::Delete | crate::action::ActionKind::Rename
    );
    if security_sensitive && destructive {
        return RiskLevel::Critical;
    }
    if security_sensitive || destructive {
        return RiskLevel::High;
    }
    // Touching many files at once is riskier than a single-file edit.
    let path_like = desc.split_whitespace().filter(|w| w.contains('/')).count();
    if path_like >= 3 {
        return RiskLevel::Medium;
    }
    RiskLevel::Low
}

fn rollback_plan_for(task: &Task) -> String {
    format!(
        "Revert the changes from '{}' via git checkout of the touched paths \
         (or restore *.bak backups if the tool kept them), then re-run the test suite.",
        task.description
    )
}

/// Ordered task list plus optional goals. The orchestrator owns exactly
/// one plan per request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tasks: Vec<Task>,
    pub goals: Vec<Goal>,
}

impl ExecutionPlan {
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut plan = Self {
            tasks,
            goals: Vec::new(),
        };
        for task in &mut plan.tasks {
            task.risk = derive_risk(task);
            if task.risk >= RiskLevel::High && task.rollback_plan.is_none() {
                task.rollback_plan = Some(rollback_plan_for(task));
            }
        }
        plan
    }

    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status() == TaskStatus::Completed)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, PlanError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(PlanError::TaskNotFound(id))
    }

    /// PENDING or FAILED -> IN_PROGRESS.
    pub fn mark_task_in_progress(&mut self, id: TaskId) -> Result<(), PlanError> {
        let task = self.task_mut(id)?;
        match task.status() {
            TaskStatus::Pending | TaskStatus::Failed => {
                task.set_status(TaskStatus::InProgress, None)?;
                Ok(())
            }
            actual => Err(PlanError::WrongStatus {
                id,
                actual,
                expected: TaskStatus::Pending,
            }),
        }
    }

    /// IN_PROGRESS -> COMPLETED; anything else is a caller bug.
    pub fn mark_task_completed(&mut self, id: TaskId) -> Result<(), PlanError> {
        let task = self.task_mut(id)?;
        if task.status() != TaskStatus::InProgress {
            return Err(PlanError::WrongStatus {
                id,
                actual: task.status(),
                expected: TaskStatus::InProgress,
            });
        }
        task.set_status(TaskStatus::Completed, None)?;
        Ok(())
    }

    pub fn mark_task_failed(&mut self, id: TaskId, error: &str) -> Result<(), PlanError> {
        let task = self.task_mut(id)?;
        task.set_status(TaskStatus::Failed, Some(error))?;
        task.error = Some(error.to_string());
        Ok(())
    }

    /// True when any task mutates code (used for coverage synthesis and
    /// goal derivation).
    pub fn mutates_code(&self) -> bool {
        self.tasks.iter().any(|t| t.action.is_mutating())
    }
}
