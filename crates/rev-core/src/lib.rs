//! Core data model for the rev orchestrator: tasks, plans, goals,
//! the tool-error taxonomy, resource budgets, and the execution context.
//!
//! Everything here is plain data plus invariant enforcement. No I/O.

pub mod action;
pub mod budget;
pub mod context;
pub mod error;
pub mod goal;
pub mod plan;
pub mod result;
pub mod task;
pub mod verification;

pub use action::ActionKind;
pub use budget::{RecoveryBudgets, ResourceBudget};
pub use context::{AgentRequest, ExecutionContext, LastToolCall};
pub use error::{ToolError, ToolErrorKind};
pub use goal::{Goal, GoalMetric, GoalStatus};
pub use plan::{ExecutionPlan, PlanError, RiskLevel};
pub use result::{AgentPhase, OrchestratorResult};
pub use task::{Task, TaskId, TaskStateError, TaskStatus, ToolEvent, ValidationStep};
pub use verification::VerificationResult;
