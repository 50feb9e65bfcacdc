//! Post-execution verification: decide pass / fail / inconclusive for a
//! completed task from its tool evidence, the workspace state, and the
//! declarative validation matrix.
//!
//! Ordering of the checks matters and is fixed: tool-level no-op
//! signatures first, then the looks-done-vs-is-done guard, then the
//! action-specific handler, then validation steps or the strict matrix,
//! with TDD gating applied last.

pub mod files;
pub mod install;
pub mod language;
pub mod noop;
pub mod refactor;
pub mod remediate;
pub mod resolve;
pub mod runner;
pub mod strict;
pub mod tdd;
pub mod tests_exec;
pub mod watch;

use serde_json::{json, Value};

use rev_config::RepoConfig;
use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::task::{Task, TaskStatus};
use rev_core::verification::VerificationResult;
use rev_tools::Dispatcher;

pub use language::test_command_for;
pub use strict::StrictMode;

/// Actions the loop verifies at all; everything else skips verification.
pub const VERIFIABLE_ACTIONS: &[ActionKind] = &[
    ActionKind::Refactor,
    ActionKind::Add,
    ActionKind::Create,
    ActionKind::Edit,
    ActionKind::CreateDirectory,
    ActionKind::Test,
    ActionKind::Read,
    ActionKind::Analyze,
    ActionKind::Research,
    ActionKind::Investigate,
    ActionKind::General,
];

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// None disables the declarative matrix entirely.
    pub strict_mode: Option<StrictMode>,
    pub tdd_enabled: bool,
    pub timeout_secs: u64,
    pub repo: RepoConfig,
    pub allow_auto_install: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            strict_mode: Some(StrictMode::Smoke),
            tdd_enabled: false,
            timeout_secs: 120,
            repo: RepoConfig::default(),
            allow_auto_install: true,
        }
    }
}

pub struct Verifier<'a> {
    dispatcher: &'a Dispatcher,
    config: VerifierConfig,
}

impl<'a> Verifier<'a> {
    pub fn new(dispatcher: &'a Dispatcher, config: VerifierConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Verify one completed task.
    #[tracing::instrument(skip_all, fields(task = %task.id, action = %task.action))]
    pub async fn verify_task(&self, task: &Task, ctx: &mut ExecutionContext) -> VerificationResult {
        if task.status() != TaskStatus::Completed {
            return VerificationResult::fail(
                format!("Task status is {}, not COMPLETED", task.status()),
                false,
            );
        }

        // Tool-level no-ops trump everything else.
        for event in task.tool_events.iter().rev() {
            if let Some(reason) = noop::extract_tool_noop(&event.tool, event.raw_result.as_deref()) {
                return VerificationResult::fail(reason, true)
                    .with_detail("tool", json!(event.tool.clone()));
            }
        }

        // Looks-done vs is-done: a mutating task whose only evidence is
        // reads did not actually change anything.
        if task.action.is_mutating() && noop::task_executed_only_reads(task) {
            let tools: Vec<&str> = task.tool_events.iter().map(|e| e.tool.as_str()).collect();
            return VerificationResult::fail(
                "Task performed only read-only tool calls; no changes were made",
                true,
            )
            .with_detail("tools", json!(tools));
        }

        let workspace = self.dispatcher.workspace();

        // A mislabeled directory creation (last call was create_directory
        // under an add/create action) verifies as a directory.
        let last_was_mkdir = ctx
            .last_tool_call(task.id)
            .is_some_and(|c| c.tool.eq_ignore_ascii_case("create_directory"));
        let result = if last_was_mkdir && matches!(task.action, ActionKind::Add | ActionKind::Create)
        {
            files::verify_directory_creation(task, ctx, workspace)
        } else {
            match task.action {
                ActionKind::Refactor => {
                    refactor::verify_refactoring(task, ctx, workspace, self.dispatcher).await
                }
                ActionKind::Add | ActionKind::Create => {
                    files::verify_file_creation(task, ctx, workspace)
                }
                ActionKind::Edit => files::verify_file_edit(task, ctx, workspace),
                ActionKind::CreateDirectory => {
                    files::verify_directory_creation(task, ctx, workspace)
                }
                ActionKind::Test => {
                    let vr = tests_exec::verify_test_execution(
                        task,
                        ctx,
                        self.dispatcher,
                        self.config.timeout_secs,
                    )
                    .await;
                    return tdd::apply_tdd_rules(task, ctx, vr, workspace, self.config.tdd_enabled);
                }
                ActionKind::Read
                | ActionKind::Analyze
                | ActionKind::Research
                | ActionKind::Investigate
                | ActionKind::General => files::verify_read_task(task),
                other => VerificationResult::pass(format!(
                    "No specific verification available for action type '{other}'"
                ))
                .with_detail("skipped", json!(true)),
            }
        };

        let result = self.apply_declarative_validation(task, ctx, result).await;
        tdd::apply_tdd_rules(task, ctx, result, workspace, self.config.tdd_enabled)
    }

    /// S3: explicit validation steps win; otherwise the mode-driven
    /// matrix; otherwise an `edit` with no way to validate at all is
    /// inconclusive so the loop injects a targeted test task.
    async fn apply_declarative_validation(
        &self,
        task: &Task,
        ctx: &mut ExecutionContext,
        mut result: VerificationResult,
    ) -> VerificationResult {
        if !result.passed {
            return result;
        }
        if !matches!(
            task.action,
            ActionKind::Add | ActionKind::Create | ActionKind::Edit | ActionKind::Refactor
        ) {
            return result;
        }

        if !task.validation_steps.is_empty() {
            match strict::run_validation_steps(task, self.dispatcher, ctx, self.config.timeout_secs)
                .await
            {
                Err(failed) => return failed,
                Ok(details) if !details.is_empty() => {
                    result = result.with_detail("validation", Value::Object(details));
                    return result;
                }
                Ok(_) => {}
            }
        } else if let Some(mode) = self.config.strict_mode {
            let paths = files::touched_paths(task, ctx, self.dispatcher.workspace());
            let strict_config = strict::StrictConfig {
                mode,
                timeout_secs: self.config.timeout_secs,
                repo: &self.config.repo,
                allow_auto_install: self.config.allow_auto_install,
            };
            match strict::run_strict_matrix(task, &paths, &strict_config, self.dispatcher, ctx).await
            {
                Err(failed) => return failed,
                Ok(details) if !details.is_empty() => {
                    result = result.with_detail("strict", Value::Object(details));
                    return result;
                }
                Ok(_) => {}
            }
        }

        // Nothing validated the change. For edits that is not enough
        // evidence of correctness.
        if task.action == ActionKind::Edit {
            let mut inconclusive = VerificationResult::inconclusive(
                "File was edited but no validation step was defined",
            );
            if let Some(file_path) = result.detail_str("file_path") {
                inconclusive = inconclusive.with_detail("file_path", json!(file_path));
                inconclusive = inconclusive.with_detail(
                    "suggestion",
                    json!(format!("Run {}", test_command_for(file_path))),
                );
            }
            return inconclusive;
        }
        result
    }
}
