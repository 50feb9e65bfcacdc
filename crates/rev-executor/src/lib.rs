//! Sub-agent dispatch: route one task to the agent bound to its action
//! kind, capture tool evidence onto the task, and translate agent
//! outcomes (structured output or sentinel strings) into task state.

pub mod agent;
pub mod dispatch;
pub mod output;
pub mod registry;

pub use agent::ChatToolAgent;
pub use dispatch::Executor;
pub use output::{AgentOutcome, Evidence, SubAgentOutput};
pub use registry::AgentRegistry;

use async_trait::async_trait;

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_tools::Dispatcher;

/// One sub-agent. Agents may append to the context (agent state, work
/// history, tool events via the dispatcher) but never set task status;
/// only the executor and verifier do, through the state machine.
#[async_trait]
pub trait SubAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Tool names this agent is allowed to call.
    fn allowed_tools(&self) -> Vec<String>;

    async fn execute(
        &self,
        task: &Task,
        ctx: &mut ExecutionContext,
        dispatcher: &Dispatcher,
    ) -> anyhow::Result<AgentOutcome>;
}
