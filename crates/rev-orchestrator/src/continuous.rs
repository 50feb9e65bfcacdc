//! The continuous REPL: one lightweight planning call per iteration,
//! preflight, dispatch, verification, budgets, breakers.

use serde_json::json;

use rev_core::action::ActionKind;
use rev_core::context::{AgentRequest, ExecutionContext};
use rev_core::plan::ExecutionPlan;
use rev_core::result::{AgentPhase, OrchestratorResult};
use rev_core::task::{Task, TaskStatus};
use rev_core::verification::VerificationResult;
use rev_llm::ChatMessage;
use rev_planner::{parse_action_line, NextActionInput, NextActionPlanner, RouteDecision};
use rev_verify::{test_command_for, Verifier, VERIFIABLE_ACTIONS};

use crate::checkpoint::Checkpoint;
use crate::circuit::{action_signature, failure_signature, preflight_signature, SignatureCounter};
use crate::classify::classify_verification_failure;
use crate::code_state::code_state_hash;
use crate::grounding::{collect_evidence, is_completion_grounded, AnchoringDecision, AnchoringScorer};
use crate::Orchestrator;

const REDUNDANT_READ_LIMIT: u32 = 5;

const LAST_GREEN_HASH: &str = "last_green_code_hash";
const GROUNDING_FIX_INJECTED: &str = "grounding_fix_injected";
const ANCHORING_FIX_INJECTED: &str = "anchoring_fix_injected";

impl Orchestrator {
    pub(crate) async fn continuous_execution(
        &self,
        route: &RouteDecision,
        ctx: &mut ExecutionContext,
        result: &mut OrchestratorResult,
    ) {
        let verifier_config = self.verifier_config(route);
        let available_actions = self.executor.registry().registered_actions();
        let scorer = AnchoringScorer::default();

        let mut iteration: u32 = 0;
        let mut action_counts = SignatureCounter::new();
        let mut failure_counts = SignatureCounter::new();
        let mut forced_next: Option<Task> = None;

        loop {
            iteration += 1;
            ctx.set_state("current_iteration", json!(iteration));
            ctx.budget.update_step();

            if self.cancel.is_cancelled() {
                result.interrupted = true;
                result.phase_reached = AgentPhase::Planning;
                ctx.add_error("Interrupted by escape request");
                return;
            }

            if ctx.budget.is_exceeded() {
                ctx.set_state("no_retry", json!(true));
                result.no_retry = true;
                ctx.add_error(format!(
                    "Resource budget exceeded at step {iteration} ({})",
                    ctx.budget.usage_summary()
                ));
                return;
            }

            // Nothing changed since a green run: the request is done.
            if self.tests_green_and_stable(ctx) {
                result.success = true;
                result.phase_reached = AgentPhase::Complete;
                return;
            }

            result.phase_reached = AgentPhase::Planning;
            let next_task = match forced_next.take() {
                Some(task) => Some(task),
                None => match self.plan_next(ctx, &available_actions).await {
                    Ok(task) => task,
                    Err(message) => {
                        // An escape raised at the planner entry point is an
                        // interruption, not a planner failure.
                        if self.cancel.is_cancelled() {
                            result.interrupted = true;
                            ctx.add_error("Interrupted by escape request");
                            return;
                        }
                        ctx.set_state("no_retry", json!(true));
                        result.no_retry = true;
                        ctx.add_error(format!("Planner failed to produce a next action: {message}"));
                        return;
                    }
                },
            };

            let Some(mut task) = next_task else {
                // Planner says the goal is achieved; only accept grounded
                // completions.
                let evidence = collect_evidence(&ctx.work_history);
                let (grounded, gap) = is_completion_grounded(&evidence, self.config.coding_mode);
                let anchoring = scorer.compute(
                    evidence.completed_claims,
                    evidence.research_steps,
                    evidence.test_outputs,
                    0,
                    0,
                    evidence.completed_claims,
                );
                result
                    .insights
                    .insert("anchoring_score".into(), json!(anchoring.raw_score));

                if grounded && anchoring.decision == AnchoringDecision::Stop {
                    result.success = true;
                    result.phase_reached = AgentPhase::Complete;
                    return;
                }

                if !grounded {
                    if ctx.state_bool(GROUNDING_FIX_INJECTED) {
                        ctx.set_state("no_retry", json!(true));
                        result.no_retry = true;
                        ctx.add_error(
                            "Circuit breaker: planner exhausted (completion still ungrounded after one injected fix)",
                        );
                        self.print_breaker(
                            "PLANNER EXHAUSTION",
                            "completion claimed without grounding evidence",
                        );
                        return;
                    }
                    ctx.set_state(GROUNDING_FIX_INJECTED, json!(true));
                    forced_next = Some(self.grounding_fix_task(gap, anchoring.decision));
                    continue;
                }

                // Grounded, but the anchoring score wants more evidence.
                // One extra round; after that the grounded completion is
                // accepted rather than spinning forever.
                if ctx.state_bool(ANCHORING_FIX_INJECTED) {
                    result.success = true;
                    result.phase_reached = AgentPhase::Complete;
                    result
                        .insights
                        .insert("anchoring_below_threshold".into(), json!(true));
                    return;
                }
                ctx.set_state(ANCHORING_FIX_INJECTED, json!(true));
                forced_next = Some(self.grounding_fix_task(gap, anchoring.decision));
                continue;
            };

            // Read-only runs never mutate: coerce in flight.
            if ctx.read_only && task.action.is_mutating() {
                task.description = format!("Review only (read-only mode): {}", task.description);
                task.action = ActionKind::Review;
            }

            // Preflight 1: action semantics.
            let semantics = rev_preflight::check_action_semantics(&mut task);
            if !semantics.ok {
                let signature =
                    preflight_signature("action_semantics", task.action.as_str(), &semantics.messages);
                ctx.add_error(format!("Preflight failed: {}", semantics.messages.join("; ")));
                ctx.record_work(format!("[FAILED] Preflight: {}", semantics.messages.join("; ")));
                if failure_counts.record_and_check(&signature) {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    ctx.add_error("Circuit breaker: repeating preflight action semantics failure");
                    self.print_breaker(
                        "PREFLIGHT FAILURE",
                        "planner is not producing an executable action; refusing to loop",
                    );
                    return;
                }
                continue;
            }

            // Preflight 2: paths.
            let paths = rev_preflight::check_task_paths(&mut task, self.dispatcher.workspace().root());
            if !paths.ok {
                let key = paths.messages.first().cloned().unwrap_or_default();
                let signature = preflight_signature("paths", task.action.as_str(), &[key.clone()]);
                ctx.add_error(format!("Preflight failed: {key}"));
                ctx.record_work(format!("[FAILED] Preflight: {key}"));
                if failure_counts.record_and_check(&signature) {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    ctx.add_error("Circuit breaker: repeating preflight path failure");
                    self.print_breaker(
                        "PREFLIGHT FAILURE",
                        "planner keeps referencing paths that cannot be resolved",
                    );
                    return;
                }
                continue;
            }

            // Anti-loop: identical proposals trip the repeat-action breaker.
            let signature = action_signature(task.action.as_str(), &task.description);
            if action_counts.record_and_check(&signature) {
                ctx.set_state("no_retry", json!(true));
                result.no_retry = true;
                ctx.add_error(format!(
                    "Circuit breaker: repeating action '{}'",
                    task.action
                ));
                self.print_breaker(
                    "REPEATED ACTION",
                    "planner is not making forward progress; refusing to repeat the same step",
                );
                return;
            }

            // Redundant-read guard.
            if let Some(rel_path) = self.redundant_read_target(&task, ctx) {
                let count = ctx.file_read_count(&rel_path);
                ctx.push_agent_request(AgentRequest::RedundantRead {
                    path: rel_path.clone(),
                    count,
                });
                ctx.record_work(format!(
                    "[REFUSED] [{}] re-reading {rel_path} ({count} reads already)",
                    task.action.as_str().to_uppercase()
                ));
                continue;
            }

            // Anti-thrash: synthesize a skipped test run instead of
            // re-running an unchanged suite.
            if task.action == ActionKind::Test {
                if let Some(skipped) = self.skipped_test_payload(ctx) {
                    let _ = task.set_status(TaskStatus::InProgress, None);
                    let _ = task.set_status(TaskStatus::Completed, Some("tests skipped"));
                    task.result = Some(skipped);
                }
            }

            result.phase_reached = AgentPhase::Execution;
            if self.cancel.is_cancelled() {
                let _ = task.set_status(TaskStatus::Stopped, Some("escape requested"));
                result.interrupted = true;
                ctx.add_error("Interrupted by escape request");
                return;
            }
            if task.status() == TaskStatus::Pending {
                self.executor
                    .dispatch(&mut task, ctx, self.dispatcher.as_ref())
                    .await;
            }

            // The plan snapshot mirrors the task's final state.
            ctx.plan = Some(ExecutionPlan::new(vec![task.clone()]));

            if let Some(error) = task.error.clone() {
                self.record_failure_memory(&error);
            }

            if task.status() == TaskStatus::Stopped {
                ctx.record_work(format!(
                    "[STOPPED] [{}] {}",
                    task.action.as_str().to_uppercase(),
                    task.description
                ));
                return;
            }

            // Verification.
            result.phase_reached = AgentPhase::Verification;
            let verification = if task.status() == TaskStatus::Completed
                && VERIFIABLE_ACTIONS.contains(&task.action)
            {
                let verifier = Verifier::new(self.dispatcher.as_ref(), verifier_config.clone());
                Some(verifier.verify_task(&task, ctx).await)
            } else {
                None
            };

            if let Some(vr) = &verification {
                ctx.verification_history.push(vr.clone());
                if vr.details.get("blocked") == Some(&json!(true)) {
                    ctx.set_state("tests_blocked_no_changes", json!(true));
                }
            }

            let verified_ok = verification.as_ref().map(|vr| vr.passed).unwrap_or(true);
            let inconclusive = verification
                .as_ref()
                .map(|vr| vr.inconclusive)
                .unwrap_or(false);

            if inconclusive {
                let vr = verification.as_ref().unwrap();
                ctx.record_work(format!(
                    "[INCONCLUSIVE] [{}] {} | {}",
                    task.action.as_str().to_uppercase(),
                    task.description,
                    vr.message
                ));
                forced_next = Some(self.injected_test_task(vr));
                self.save_checkpoint(iteration, ctx);
                continue;
            }

            if !verified_ok {
                let vr = verification.as_ref().unwrap();
                self.record_failure_memory(&vr.message);
                ctx.record_work(format!(
                    "[FAILED] [{}] {} | Verification: {}",
                    task.action.as_str().to_uppercase(),
                    task.description,
                    vr.message
                ));
                ctx.add_error(format!("Verification failed: {}", vr.message));

                if vr.is_fatal() {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    return;
                }

                let kind = classify_verification_failure(vr);
                let remaining = ctx.recovery_budgets.consume(kind);
                if remaining == 0 {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    ctx.add_error(format!("Recovery budget exhausted for {kind}"));
                    self.print_breaker(
                        "RECOVERY BUDGET EXHAUSTED",
                        &format!("no budget left for '{kind}' failures"),
                    );
                    return;
                }

                let signature = failure_signature(task.action.as_str(), &vr.message);
                if failure_counts.record_and_check(&signature) {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    ctx.add_error("Circuit breaker: repeating verification failure");
                    self.print_breaker(
                        "REPEATED VERIFICATION FAILURE",
                        "verification is failing the same way repeatedly; refusing to loop",
                    );
                    return;
                }

                // LLM-assisted decomposition of the failed step (never
                // for test failures: a focused fix beats vague subtasks).
                if vr.should_replan && task.action != ActionKind::Test {
                    if let Some(decomposed) = self.decompose_failed_task(&task, vr).await {
                        forced_next = Some(decomposed);
                    }
                }
                self.save_checkpoint(iteration, ctx);
                continue;
            }

            // Success bookkeeping.
            if task.status() == TaskStatus::Completed {
                ctx.record_work(format!(
                    "[COMPLETED] [{}] {}",
                    task.action.as_str().to_uppercase(),
                    task.description
                ));
            } else {
                ctx.record_work(format!(
                    "[{}] [{}] {} | Reason: {}",
                    task.status(),
                    task.action.as_str().to_uppercase(),
                    task.description,
                    task.error.as_deref().unwrap_or("unknown")
                ));
            }

            if task.status() == TaskStatus::Completed && task.action.is_mutating() {
                ctx.set_state("last_code_change_iteration", json!(iteration));
                ctx.clear_state("tests_blocked_no_changes");
                ctx.clear_state(LAST_GREEN_HASH);
            }

            if task.action == ActionKind::Test && verified_ok {
                let skipped_blocked = verification
                    .as_ref()
                    .is_some_and(|vr| vr.details.get("blocked") == Some(&json!(true)));
                if !skipped_blocked && ctx.state_i64("last_test_rc") == Some(0) {
                    ctx.set_state(
                        LAST_GREEN_HASH,
                        json!(code_state_hash(&ctx.workspace_root)),
                    );
                    if self.tests_green_and_stable(ctx) {
                        result.success = true;
                        result.phase_reached = AgentPhase::Complete;
                        self.save_checkpoint(iteration, ctx);
                        return;
                    }
                }
            }

            self.save_checkpoint(iteration, ctx);
        }
    }

    /// Ask the continuous planner for the next action, honoring the TDD
    /// force-test flag without spending a chat call.
    async fn plan_next(
        &self,
        ctx: &mut ExecutionContext,
        available_actions: &[ActionKind],
    ) -> Result<Option<Task>, String> {
        if ctx.state_bool(rev_verify::tdd::TDD_REQUIRE_TEST) {
            ctx.clear_state(rev_verify::tdd::TDD_REQUIRE_TEST);
            return Ok(Some(Task::new(
                ActionKind::Test,
                "Run the project test suite to confirm the implementation went green",
            )));
        }

        if self.cancel.is_cancelled() {
            return Err("escape requested".to_string());
        }

        let warnings: Vec<String> = ctx
            .take_agent_requests()
            .iter()
            .map(AgentRequest::as_warning)
            .collect();
        let input = NextActionInput {
            user_request: ctx.user_request.clone(),
            work_summary: ctx.recent_work(5).to_vec(),
            warnings,
            tests_blocked: ctx.state_bool("tests_blocked_no_changes"),
            last_test_rc: ctx.state_i64("last_test_rc"),
        };
        let planner = NextActionPlanner::new(self.chat.as_ref(), available_actions);
        planner
            .next_action(&input)
            .await
            .map_err(|e| e.to_string())
    }

    /// The file a read task would re-read past the redundancy limit.
    fn redundant_read_target(&self, task: &Task, ctx: &ExecutionContext) -> Option<String> {
        if task.action != ActionKind::Read {
            return None;
        }
        let workspace = self.dispatcher.workspace();
        for token in task.description.split_whitespace() {
            let token = token.trim_matches(['"', '\'', '`', ',', '.']);
            if !token.contains('/') && !token.contains('.') {
                continue;
            }
            if let Ok(resolved) = workspace.resolve(token, "redundancy check") {
                if ctx.file_read_count(&resolved.rel_path) >= REDUNDANT_READ_LIMIT {
                    return Some(resolved.rel_path);
                }
            }
        }
        None
    }

    /// Skip payload for a test task when nothing changed since the last
    /// run (iteration-based) or since the last green run (hash-based).
    fn skipped_test_payload(&self, ctx: &ExecutionContext) -> Option<String> {
        let current_hash = code_state_hash(&ctx.workspace_root);
        if ctx.state(LAST_GREEN_HASH).and_then(|v| v.as_str()) == Some(current_hash.as_str()) {
            return Some(
                json!({
                    "skipped": true,
                    "kind": "skipped_tests",
                    "last_test_rc": 0,
                    "last_test_iteration": ctx.state_i64("last_test_iteration"),
                })
                .to_string(),
            );
        }

        let last_test = ctx.state_i64("last_test_iteration")?;
        let last_change = ctx.state_i64("last_code_change_iteration").unwrap_or(-1);
        let last_rc = ctx.state_i64("last_test_rc")?;
        // A run with no code change since the last one (including "no
        // change ever") is a re-run and gets skipped.
        if last_change <= last_test {
            return Some(
                json!({
                    "skipped": true,
                    "kind": "skipped_tests",
                    "last_test_rc": last_rc,
                    "last_test_iteration": last_test,
                })
                .to_string(),
            );
        }
        None
    }

    /// Tests are green and no code change happened after the green run.
    fn tests_green_and_stable(&self, ctx: &ExecutionContext) -> bool {
        let Some(last_test) = ctx.state_i64("last_test_iteration") else {
            return false;
        };
        if ctx.state_i64("last_test_rc") != Some(0) {
            return false;
        }
        let last_change = ctx.state_i64("last_code_change_iteration").unwrap_or(-1);
        last_change != -1 && last_change <= last_test
    }

    fn grounding_fix_task(&self, gap: &str, decision: AnchoringDecision) -> Task {
        if decision == AnchoringDecision::Debate || gap.contains("action") {
            Task::new(
                ActionKind::Review,
                "Review the claimed completion against the original request using list_dir on .",
            )
        } else {
            Task::new(
                ActionKind::Read,
                "Read the files most relevant to the request to ground the conclusion",
            )
        }
    }

    /// After an inconclusive verification the loop injects a targeted
    /// test task for the touched file's language.
    fn injected_test_task(&self, vr: &VerificationResult) -> Task {
        let command = vr
            .detail_str("file_path")
            .map(test_command_for)
            .unwrap_or("pytest -q");
        let target = vr.detail_str("file_path").unwrap_or("the touched files");
        Task::new(
            ActionKind::Test,
            format!("Run {command} to validate the change to {target}"),
        )
    }

    /// Ask the model whether a failed task decomposes into a smaller next
    /// step; `CANNOT_DECOMPOSE` (or a transport error) means no.
    async fn decompose_failed_task(&self, failed: &Task, vr: &VerificationResult) -> Option<Task> {
        let prompt = format!(
            "A task has failed: {description}\n\n\
             Error: {error}\n\n\
             Can this task be decomposed into smaller, more specific subtasks that might succeed?\n\
             If yes, describe the first subtask that should be attempted next in detail.\n\
             If no, just respond with 'CANNOT_DECOMPOSE'.\n\n\
             Important import strategy note:\n\
             - If a refactor split created a package (directory with __init__.py exports), update \
             call sites/tests to import from the package exports.\n\
             - Do NOT expand `from pkg import *` into dozens of per-module imports.\n\n\
             Be specific about the concrete action. Use the [ACTION_TYPE] format, e.g. [CREATE] or \
             [EDIT] or [REFACTOR].",
            description = failed.description,
            error = vr.message,
        );
        let reply = self
            .chat
            .chat(&[ChatMessage::user(prompt)], None)
            .await
            .ok()?;
        if reply.content.to_uppercase().contains("CANNOT_DECOMPOSE") {
            return None;
        }
        let task = parse_action_line(&reply.content)?;
        tracing::info!(action = %task.action, "using decomposed task for next iteration");
        Some(task)
    }

    fn record_failure_memory(&self, message: &str) {
        if let Err(error) = self.memory.maybe_record_known_failure_from_error(message) {
            tracing::debug!(%error, "could not record failure mode in project memory");
        }
    }

    fn save_checkpoint(&self, iteration: u32, ctx: &ExecutionContext) {
        if !self.config.checkpoints {
            return;
        }
        let path = self.layout.checkpoint_file(&self.session_id.to_string());
        let checkpoint = Checkpoint::capture(&self.session_id.to_string(), iteration, ctx);
        if let Err(error) = checkpoint.save(&path) {
            tracing::debug!(%error, "checkpoint save failed");
        }
    }

    pub(crate) fn print_breaker(&self, title: &str, blocking_issue: &str) {
        tracing::error!(breaker = title, issue = blocking_issue, "circuit breaker tripped");
        eprintln!("\n{}", "=".repeat(70));
        eprintln!("CIRCUIT BREAKER - {title}");
        eprintln!("{}", "=".repeat(70));
        eprintln!("Blocking issue: {blocking_issue}.");
        eprintln!("Next step: run with `--debug` and share the last verification failure + tool args.\n");
    }
}
