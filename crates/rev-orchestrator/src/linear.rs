//! Linear mode: batch-plan the request, then execute the plan in order
//! through the same preflight/dispatch/verify pipeline as the REPL.

use serde_json::json;

use rev_core::context::ExecutionContext;
use rev_core::result::{AgentPhase, OrchestratorResult};
use rev_core::task::TaskStatus;
use rev_planner::{BatchPlanner, PlannerConfig, RouteDecision};
use rev_verify::{Verifier, VERIFIABLE_ACTIONS};

use crate::circuit::{failure_signature, SignatureCounter};
use crate::classify::classify_verification_failure;
use crate::Orchestrator;

impl Orchestrator {
    pub(crate) async fn linear_execution(
        &self,
        route: &RouteDecision,
        ctx: &mut ExecutionContext,
        result: &mut OrchestratorResult,
    ) {
        result.phase_reached = AgentPhase::Planning;

        if self.cancel.is_cancelled() {
            result.interrupted = true;
            return;
        }

        let planner = BatchPlanner::new(
            self.chat.as_ref(),
            PlannerConfig {
                coding_mode: self.config.coding_mode,
                ..Default::default()
            },
        );
        let repo_context = self.memory.read().unwrap_or_default();
        let plan = match planner
            .plan(
                &ctx.user_request.clone(),
                &repo_context,
                Some(self.dispatcher.as_ref()),
                ctx,
            )
            .await
        {
            Ok(plan) => plan,
            Err(error) => {
                ctx.add_error(format!("Planning failed: {error}"));
                return;
            }
        };
        ctx.plan = Some(plan);
        result.plan = ctx.plan.clone();

        result.phase_reached = AgentPhase::Execution;
        let verifier_config = self.verifier_config(route);
        let mut failure_counts = SignatureCounter::new();
        let task_ids: Vec<_> = ctx
            .plan
            .as_ref()
            .map(|p| p.tasks.iter().map(|t| t.id).collect())
            .unwrap_or_default();

        for task_id in task_ids {
            ctx.budget.update_step();
            if self.cancel.is_cancelled() {
                result.interrupted = true;
                return;
            }
            if ctx.budget.is_exceeded() {
                ctx.set_state("no_retry", json!(true));
                result.no_retry = true;
                ctx.add_error("Resource budget exceeded during linear execution");
                return;
            }

            // Take the task out, run it, put it back: the executor and
            // the context cannot borrow the plan at the same time.
            let mut task = {
                let plan = ctx.plan.as_mut().unwrap();
                let index = plan.tasks.iter().position(|t| t.id == task_id).unwrap();
                plan.tasks.remove(index)
            };

            if ctx.read_only && task.action.is_mutating() {
                task.description = format!("Review only (read-only mode): {}", task.description);
                task.action = rev_core::action::ActionKind::Review;
            }

            let semantics = rev_preflight::check_action_semantics(&mut task);
            let paths_ok = if semantics.ok {
                rev_preflight::check_task_paths(&mut task, self.dispatcher.workspace().root()).ok
            } else {
                false
            };
            if !semantics.ok || !paths_ok {
                let _ = task.set_status(TaskStatus::InProgress, None);
                let _ = task.set_status(TaskStatus::Failed, Some("preflight failed"));
                task.error = Some("preflight failed".to_string());
                ctx.record_work(format!(
                    "[FAILED] [{}] {} | Reason: preflight",
                    task.action.as_str().to_uppercase(),
                    task.description
                ));
                ctx.add_error(format!("Preflight failed for task: {}", task.description));
                ctx.plan.as_mut().unwrap().tasks.push(task);
                continue;
            }

            let mut attempts = 0;
            loop {
                attempts += 1;
                self.executor
                    .dispatch(&mut task, ctx, self.dispatcher.as_ref())
                    .await;

                if task.status() == TaskStatus::Stopped {
                    ctx.record_work(format!("[STOPPED] {}", task.description));
                    ctx.plan.as_mut().unwrap().tasks.push(task);
                    return;
                }

                let verification = if task.status() == TaskStatus::Completed
                    && VERIFIABLE_ACTIONS.contains(&task.action)
                {
                    result.phase_reached = AgentPhase::Verification;
                    let verifier = Verifier::new(self.dispatcher.as_ref(), verifier_config.clone());
                    Some(verifier.verify_task(&task, ctx).await)
                } else {
                    None
                };

                let passed = verification.as_ref().map(|vr| vr.passed).unwrap_or(true)
                    && task.status() == TaskStatus::Completed;
                if passed {
                    ctx.record_work(format!(
                        "[COMPLETED] [{}] {}",
                        task.action.as_str().to_uppercase(),
                        task.description
                    ));
                    break;
                }

                let message = verification
                    .as_ref()
                    .map(|vr| vr.message.clone())
                    .or_else(|| task.error.clone())
                    .unwrap_or_else(|| "unknown failure".to_string());
                self.record_linear_failure(ctx, &task.description, &message);

                if let Some(vr) = verification.as_ref().filter(|vr| !vr.passed) {
                    let kind = classify_verification_failure(vr);
                    if ctx.recovery_budgets.consume(kind) == 0 {
                        ctx.set_state("no_retry", json!(true));
                        result.no_retry = true;
                        ctx.add_error(format!("Recovery budget exhausted for {kind}"));
                        ctx.plan.as_mut().unwrap().tasks.push(task);
                        return;
                    }
                }
                if failure_counts.record_and_check(&failure_signature(task.action.as_str(), &message)) {
                    ctx.set_state("no_retry", json!(true));
                    result.no_retry = true;
                    ctx.add_error("Circuit breaker: repeating verification failure");
                    ctx.plan.as_mut().unwrap().tasks.push(task);
                    return;
                }

                // COMPLETED is terminal: a task that completed but failed
                // verification cannot be retried in place, only re-planned.
                if attempts > route.max_retries || task.status() != TaskStatus::Failed {
                    ctx.plan.as_mut().unwrap().tasks.push(task);
                    ctx.add_error(format!("Task failed after {attempts} attempt(s): {message}"));
                    return;
                }
                // FAILED -> IN_PROGRESS happens inside dispatch on the retry.
            }

            ctx.plan.as_mut().unwrap().tasks.push(task);
        }

        let complete = ctx.plan.as_ref().is_some_and(|p| p.is_complete());
        if let Some(plan) = ctx.plan.as_mut() {
            for goal in &mut plan.goals {
                if let Some(metric) = goal
                    .metrics
                    .iter_mut()
                    .find(|m| m.name == "all_tasks_completed")
                {
                    metric.current = Some(json!(complete));
                }
                goal.evaluate();
            }
        }
        result.plan = ctx.plan.clone();
        result.success = complete;
        result.phase_reached = if complete {
            AgentPhase::Complete
        } else {
            AgentPhase::Verification
        };
    }

    fn record_linear_failure(&self, ctx: &mut ExecutionContext, description: &str, message: &str) {
        ctx.record_work(format!("[FAILED] {description} | Reason: {message}"));
        ctx.add_error(format!("Task failed: {message}"));
        if let Err(error) = self.memory.maybe_record_known_failure_from_error(message) {
            tracing::debug!(%error, "could not record failure mode");
        }
    }
}
