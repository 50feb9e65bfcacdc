//! The orchestrator loop: plan next → preflight → dispatch → verify →
//! update budgets → maybe inject recovery tasks → loop, with circuit
//! breakers for every way an LLM planner can spin in place.

pub mod checkpoint;
pub mod circuit;
pub mod classify;
pub mod code_state;
pub mod continuous;
pub mod grounding;
pub mod linear;

pub use checkpoint::Checkpoint;
pub use grounding::{AnchoringDecision, AnchoringScorer};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use rev_config::{ExecutionMode, RepoConfig, RuntimeConfig, StateLayout, VerifyMode};
use rev_core::budget::ResourceBudget;
use rev_core::context::ExecutionContext;
use rev_core::result::{AgentPhase, OrchestratorResult};
use rev_executor::Executor;
use rev_llm::ChatClient;
use rev_memory::ProjectMemory;
use rev_planner::{RouteDecision, TaskRouter, ValidationMode};
use rev_tools::Dispatcher;
use rev_verify::{StrictMode, VerifierConfig};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Routed execution profile; computed from the request when absent.
    pub route: Option<RouteDecision>,
    pub runtime: RuntimeConfig,
    pub repo: RepoConfig,
    pub read_only: bool,
    /// Whether the request is expected to change code (gates completion
    /// grounding and test/doc coverage).
    pub coding_mode: bool,
    pub max_iterations: u32,
    pub checkpoints: bool,
    /// Explicit resume: restore this checkpoint before the first
    /// iteration. Never searched for implicitly.
    pub resume_from: Option<Checkpoint>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            route: None,
            runtime: RuntimeConfig::default(),
            repo: RepoConfig::default(),
            read_only: false,
            coding_mode: true,
            max_iterations: 40,
            checkpoints: true,
            resume_from: None,
        }
    }
}

pub struct Orchestrator {
    pub(crate) chat: Arc<dyn ChatClient>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) executor: Executor,
    pub(crate) memory: ProjectMemory,
    pub(crate) layout: StateLayout,
    pub(crate) config: OrchestratorConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) session_id: Ulid,
}

impl Orchestrator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        dispatcher: Arc<Dispatcher>,
        executor: Executor,
        config: OrchestratorConfig,
    ) -> Self {
        let layout = StateLayout::new(dispatcher.workspace().root());
        let memory = ProjectMemory::new(layout.project_memory_file());
        Self {
            chat,
            dispatcher,
            executor,
            memory,
            layout,
            config,
            cancel: CancellationToken::new(),
            session_id: Ulid::new(),
        }
    }

    /// Token that cancels the run cooperatively: checked at the top of
    /// every iteration, before every planner call, and before dispatch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session_id(&self) -> Ulid {
        self.session_id
    }

    /// Run one request to completion (or breaker/budget exit).
    pub async fn execute(&self, user_request: &str) -> OrchestratorResult {
        let mut result = OrchestratorResult::new();
        result.phase_reached = AgentPhase::Routing;

        if let Err(error) = self.layout.ensure() {
            result.errors.push(format!("failed to prepare workspace state dir: {error:#}"));
            return result;
        }
        if let Err(error) = self.memory.ensure() {
            tracing::warn!(%error, "project memory unavailable");
        }

        let route = self
            .config
            .route
            .clone()
            .unwrap_or_else(|| TaskRouter.route(user_request));
        result
            .insights
            .insert("route".into(), serde_json::to_value(&route).unwrap_or_default());

        let workspace_root = self.dispatcher.workspace().root().to_path_buf();
        let mut ctx = ExecutionContext::new(user_request, workspace_root);
        ctx.read_only = self.config.read_only;
        ctx.budget = ResourceBudget::default().with_step_cap(self.config.max_iterations);

        if let Some(checkpoint) = &self.config.resume_from {
            checkpoint.restore_into(&mut ctx);
            tracing::info!(iteration = checkpoint.iteration, "resumed from checkpoint");
        }

        match self.config.runtime.execution_mode {
            ExecutionMode::SubAgent => {
                self.continuous_execution(&route, &mut ctx, &mut result).await;
            }
            ExecutionMode::Linear => {
                self.linear_execution(&route, &mut ctx, &mut result).await;
            }
        }

        result.budget_usage = ctx.budget.usage_summary();
        result.errors.extend(ctx.errors.clone());
        if result.plan.is_none() {
            result.plan = ctx.plan.clone();
        }
        result
    }

    /// Effective strict mode: the route decides, the env can force Full.
    pub(crate) fn strict_mode(&self, route: &RouteDecision) -> Option<StrictMode> {
        if self.config.runtime.verify_mode == VerifyMode::Strict {
            return Some(StrictMode::Full);
        }
        match route.validation_mode {
            ValidationMode::None => None,
            ValidationMode::Smoke => Some(StrictMode::Smoke),
            ValidationMode::Targeted => Some(StrictMode::Targeted),
            ValidationMode::Full => Some(StrictMode::Full),
        }
    }

    pub(crate) fn verifier_config(&self, route: &RouteDecision) -> VerifierConfig {
        VerifierConfig {
            strict_mode: self.strict_mode(route),
            tdd_enabled: self.config.runtime.tdd_enabled,
            timeout_secs: self.config.runtime.validation_timeout_secs,
            repo: self.config.repo.clone(),
            allow_auto_install: route.allow_auto_install,
        }
    }
}
