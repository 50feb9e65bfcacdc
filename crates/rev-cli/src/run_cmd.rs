use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use rev_config::{RepoConfig, RuntimeConfig, StateLayout};
use rev_core::action::ActionKind;
use rev_executor::{AgentRegistry, ChatToolAgent, Executor};
use rev_llm::{ChatClient, NullChat};
use rev_orchestrator::{Checkpoint, Orchestrator, OrchestratorConfig};
use rev_planner::{RouteDecision, RouteMode, TaskRouter};
use rev_tools::registry::ToolRegistry;
use rev_tools::Dispatcher;
use rev_workspace::Workspace;

use crate::cli::{ModeArg, OutputFormat};

pub struct RunArgs {
    pub request: String,
    pub workspace: Option<String>,
    pub add_roots: Vec<String>,
    pub read_only: bool,
    pub resume: Option<String>,
    pub mode: ModeArg,
    pub max_steps: u32,
    pub format: OutputFormat,
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let root = workspace_root(args.workspace.as_deref())?;
    let mut workspace = Workspace::new(root.clone());
    for extra in &args.add_roots {
        workspace.add_allowed_root(PathBuf::from(extra));
    }

    // The concrete tool/agent/chat integrations are collaborators; the
    // default build wires whatever is linked in (see `rev doctor`).
    let chat: Arc<dyn ChatClient> = Arc::new(NullChat);
    let registry = ToolRegistry::new();
    let tool_names = registry.names();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), workspace));
    let executor = Executor::new(default_agents(chat.clone(), &tool_names));

    let layout = StateLayout::new(&root);
    let repo = RepoConfig::load(&layout.repo_config_file()).unwrap_or_default();
    let runtime = RuntimeConfig::from_env();

    let resume_from = match &args.resume {
        Some(session) => Some(
            Checkpoint::load(&layout.checkpoint_file(session))
                .with_context(|| format!("cannot resume session '{session}'"))?,
        ),
        None => None,
    };

    let route = route_override(&args.mode, &args.request);
    let coding_mode = route
        .as_ref()
        .map(|r| !matches!(r.mode, RouteMode::Exploration))
        .unwrap_or(true);

    let config = OrchestratorConfig {
        route,
        runtime,
        repo,
        read_only: args.read_only,
        coding_mode,
        max_iterations: args.max_steps,
        checkpoints: true,
        resume_from,
    };

    let orchestrator = Orchestrator::new(chat, dispatcher, executor, config);
    tracing::info!(
        session = %orchestrator.session_id(),
        workspace = %root.display(),
        "starting orchestrated run"
    );

    // Ctrl-C flips the cooperative escape token; in-flight tool calls
    // finish but their results are discarded.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = orchestrator.execute(&args.request).await;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            print_summary(&result, orchestrator.session_id().to_string().as_str());
        }
    }

    if result.interrupted {
        return Ok(130);
    }
    Ok(if result.success { 0 } else { 1 })
}

fn workspace_root(arg: Option<&str>) -> Result<PathBuf> {
    let root = match arg {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root does not exist: {}", root.display()))?;
    Ok(root)
}

/// Bind the generic chat-driven agents to the action vocabulary: a
/// read agent restricted to read-only tools, a write agent, a runner.
fn default_agents(chat: Arc<dyn ChatClient>, tool_names: &[String]) -> AgentRegistry {
    let read_tools: Vec<String> = tool_names
        .iter()
        .filter(|t| rev_tools::is_read_only_tool(t))
        .cloned()
        .collect();
    let exec_tools: Vec<String> = tool_names
        .iter()
        .filter(|t| *t == "run_cmd" || *t == "run_tests")
        .cloned()
        .collect();

    let mut registry = AgentRegistry::new();
    registry.bind(
        &[
            ActionKind::Read,
            ActionKind::Analyze,
            ActionKind::Review,
            ActionKind::Research,
            ActionKind::Investigate,
            ActionKind::General,
        ],
        Arc::new(ChatToolAgent::new("read-agent", chat.clone(), read_tools)),
    );
    registry.bind(
        &[
            ActionKind::Edit,
            ActionKind::Add,
            ActionKind::Create,
            ActionKind::CreateDirectory,
            ActionKind::Refactor,
            ActionKind::Delete,
            ActionKind::Rename,
            ActionKind::Fix,
            ActionKind::Doc,
        ],
        Arc::new(ChatToolAgent::new("edit-agent", chat.clone(), tool_names.to_vec())),
    );
    registry.bind(
        &[ActionKind::Test, ActionKind::Tool, ActionKind::Run],
        Arc::new(ChatToolAgent::new("test-runner-agent", chat, exec_tools)),
    );
    registry
}

fn route_override(mode: &ModeArg, request: &str) -> Option<RouteDecision> {
    let forced = match mode {
        ModeArg::Auto => return None,
        ModeArg::QuickEdit => RouteMode::QuickEdit,
        ModeArg::FocusedFeature => RouteMode::FocusedFeature,
        ModeArg::FullFeature => RouteMode::FullFeature,
        ModeArg::Refactor => RouteMode::Refactor,
        ModeArg::TestFocus => RouteMode::TestFocus,
        ModeArg::Exploration => RouteMode::Exploration,
        ModeArg::SecurityAudit => RouteMode::SecurityAudit,
    };
    // Route normally for the tuned knobs, then pin the mode the user asked
    // for by re-routing a canonical phrase when the keyword route differs.
    let mut decision = TaskRouter.route(request);
    if decision.mode != forced {
        decision = TaskRouter.route(canonical_phrase(forced));
        decision.reasoning = format!("mode forced to {forced:?} via --mode");
    }
    Some(decision)
}

fn canonical_phrase(mode: RouteMode) -> &'static str {
    match mode {
        RouteMode::QuickEdit => "quick edit",
        RouteMode::FocusedFeature => "add a flag to cli",
        RouteMode::FullFeature => "implement a complete feature with tests across the service and its api endpoints and background workers",
        RouteMode::Refactor => "refactor the module",
        RouteMode::TestFocus => "run the tests and report coverage",
        RouteMode::Exploration => "explain how this works",
        RouteMode::SecurityAudit => "security audit of the codebase",
    }
}

fn print_summary(result: &rev_core::result::OrchestratorResult, session: &str) {
    println!();
    println!("{}", "=".repeat(60));
    println!("rev - execution summary (session {session})");
    println!("{}", "=".repeat(60));
    println!("success:  {}", result.success);
    println!("phase:    {}", result.phase_reached);
    println!("budget:   {}", result.budget_usage);
    if result.no_retry {
        println!("no_retry: true (a circuit breaker or budget stopped the run)");
    }
    if let Some(plan) = &result.plan {
        println!("tasks:");
        for task in &plan.tasks {
            println!("  [{}] [{}] {}", task.status(), task.action, task.description);
        }
    }
    if !result.errors.is_empty() {
        println!("errors:");
        for error in result.errors.iter().take(10) {
            println!("  - {error}");
        }
    }
}
