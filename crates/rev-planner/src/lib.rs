//! Planning: turn a request into an ordered task list (batch mode), or
//! propose the single next action (continuous mode), plus the request
//! router that picks an execution profile.

pub mod batch;
pub mod next_action;
pub mod parse;
pub mod router;
pub mod validation;

pub use batch::{BatchPlanner, PlannerConfig};
pub use next_action::{NextActionPlanner, NextActionInput};
pub use parse::{order_available_actions, parse_action_line, parse_task_array};
pub use router::{
    Priority, ResearchDepth, ReviewStrictness, RouteDecision, RouteMode, TaskRouter, ValidationMode,
};
pub use validation::extract_validation_steps;

#[derive(thiserror::Error, Debug)]
pub enum PlannerError {
    #[error("planner chat transport failed: {0}")]
    Chat(#[from] rev_llm::ChatError),

    #[error("planner reply was not a parsable task array after {attempts} attempts: {detail}")]
    UnparseablePlan { attempts: u32, detail: String },

    #[error("planner produced an empty plan")]
    EmptyPlan,
}
