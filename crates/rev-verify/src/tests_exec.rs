use serde_json::{json, Value};

use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_core::verification::VerificationResult;
use rev_tools::Dispatcher;

use crate::remediate::{remediation_for_run, stderr_contradicts_success};
use crate::runner::run_validation_command;
use crate::strict::no_tests_expected;
use crate::watch::diagnose_watch_timeout;

/// Verify a `test` task. Prefers the task's own tool result over
/// re-running the suite; falls back to a conservative `pytest -q` only
/// when the task carried no usable result at all.
pub async fn verify_test_execution(
    task: &Task,
    ctx: &mut ExecutionContext,
    dispatcher: &Dispatcher,
    timeout_secs: u64,
) -> VerificationResult {
    let payload = crate::resolve::parse_task_result_payload(task);

    if let Some(payload) = &payload {
        match payload.get("blocked") {
            Some(Value::Array(a)) if !a.is_empty() => {
                return VerificationResult::fail("Test command was blocked by tool allowlist", true);
            }
            Some(Value::String(s)) if !s.is_empty() => {
                return VerificationResult::fail("Test command was blocked by tool allowlist", true);
            }
            _ => {}
        }

        if payload.get("timeout").and_then(Value::as_bool) == Some(true) {
            let stdout = payload.get("stdout").and_then(Value::as_str).unwrap_or("");
            let rc = payload.get("rc").and_then(Value::as_i64).unwrap_or(-1);
            let mut vr = VerificationResult::fail("Test command timed out", true);
            if let Some(diagnosis) = diagnose_watch_timeout(rc, stdout) {
                vr = vr.with_detail("timeout_diagnosis", diagnosis);
            }
            return vr;
        }

        // "Nothing changed since the last run" skip payloads.
        if payload.get("skipped").and_then(Value::as_bool) == Some(true)
            && payload.get("kind").and_then(Value::as_str) == Some("skipped_tests")
        {
            let last_rc = payload.get("last_test_rc").and_then(Value::as_i64);
            if last_rc.is_some_and(|rc| rc != 0) {
                ctx.set_state("tests_blocked_no_changes", json!(true));
                return VerificationResult::pass(
                    "Skipped tests (no code changes since last failure)",
                )
                .with_detail("skipped", json!(true))
                .with_detail("blocked", json!(true))
                .with_detail("last_test_rc", json!(last_rc));
            }
            return VerificationResult::pass("Skipped tests (no changes since last pass)")
                .with_detail("skipped", json!(true));
        }

        if let Some(rc) = payload.get("rc").and_then(Value::as_i64) {
            let stdout = payload.get("stdout").and_then(Value::as_str).unwrap_or("");
            let stderr = payload.get("stderr").and_then(Value::as_str).unwrap_or("");
            let cmd = payload
                .get("cmd")
                .or_else(|| payload.get("command"))
                .and_then(Value::as_str)
                .unwrap_or("");
            return map_test_rc(task, ctx, rc, cmd, stdout, stderr);
        }

        return VerificationResult::fail(
            "Test command did not return an exit code (rc); cannot verify",
            true,
        );
    }

    // No payload: reuse the last run when nothing changed since.
    let last_test_iteration = ctx.state_i64("last_test_iteration");
    let last_test_rc = ctx.state_i64("last_test_rc");
    let last_code_change = ctx.state_i64("last_code_change_iteration").unwrap_or(-1);
    if let Some(test_iter) = last_test_iteration {
        if last_code_change != -1 && last_code_change <= test_iter {
            if last_test_rc == Some(0) {
                return VerificationResult::pass("Skipped tests (no changes since last pass)")
                    .with_detail("skipped", json!(true));
            }
            ctx.set_state("tests_blocked_no_changes", json!(true));
            return VerificationResult::pass("Skipped tests (no code changes since last failure)")
                .with_detail("skipped", json!(true))
                .with_detail("blocked", json!(true));
        }
    }

    // Conservative fallback run.
    let Some(outcome) = run_validation_command(dispatcher, ctx, "pytest -q", true, timeout_secs).await
    else {
        return VerificationResult::fail(
            "Could not verify test execution: no test runner tool is registered",
            true,
        );
    };
    map_test_rc(
        task,
        ctx,
        outcome.rc.unwrap_or(1),
        "pytest -q",
        &outcome.stdout,
        &outcome.stderr,
    )
}

/// rc semantics: 0 pass, 4 pass (legacy no-tests), 5 inconclusive unless
/// explicitly expected, anything else failed. Records the run in agent
/// state for the loop's anti-thrash rules.
fn map_test_rc(
    task: &Task,
    ctx: &mut ExecutionContext,
    rc: i64,
    cmd: &str,
    stdout: &str,
    stderr: &str,
) -> VerificationResult {
    let iteration = ctx.state_i64("current_iteration").unwrap_or(0);
    ctx.set_state("last_test_iteration", json!(iteration));
    ctx.set_state("last_test_rc", json!(rc));

    let output: String = format!("{stdout}{stderr}").chars().take(500).collect();

    match rc {
        0 => {
            if stderr_contradicts_success(rc, stderr) {
                let mut vr = VerificationResult::fail(
                    "Command exited 0 but stderr contains error-level output",
                    true,
                );
                if let Some(remediation) = remediation_for_run(rc, stdout, stderr) {
                    vr = vr.with_detail("remediation", remediation);
                }
                return vr;
            }
            if !cmd.is_empty() && !cmd.to_lowercase().contains("pytest") {
                VerificationResult::pass("Command succeeded")
                    .with_detail("rc", json!(rc))
                    .with_detail("command", json!(cmd))
            } else {
                VerificationResult::pass("Tests passed")
                    .with_detail("rc", json!(rc))
                    .with_detail("output", json!(output))
            }
        }
        4 => VerificationResult::pass("No tests collected (rc=4), treated as pass")
            .with_detail("rc", json!(rc)),
        5 => {
            if no_tests_expected(task) {
                VerificationResult::pass("No tests collected (rc=5), explicitly allowed")
                    .with_detail("rc", json!(rc))
            } else {
                VerificationResult::inconclusive(
                    "Verification INCONCLUSIVE: test runner collected 0 tests (rc=5)",
                )
                .with_detail("rc", json!(rc))
                .with_detail("output", json!(output))
            }
        }
        _ => {
            let mut vr = VerificationResult::fail(format!("Tests failed (rc={rc})"), true)
                .with_detail("rc", json!(rc))
                .with_detail("output", json!(output));
            if let Some(remediation) = remediation_for_run(rc, stdout, stderr) {
                vr = vr.with_detail("remediation", remediation);
            }
            vr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rev_core::action::ActionKind;
    use rev_tools::registry::ToolRegistry;
    use rev_workspace::Workspace;
    use std::sync::Arc;

    fn fixture() -> (Dispatcher, ExecutionContext) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::mem::forget(dir);
        (
            Dispatcher::new(Arc::new(ToolRegistry::new()), Workspace::new(root.clone())),
            ExecutionContext::new("r", root),
        )
    }

    fn test_task(payload: Value) -> Task {
        let mut task = Task::new(ActionKind::Test, "run the test suite");
        task.result = Some(payload.to_string());
        task
    }

    #[tokio::test]
    async fn test_rc_zero_passes_and_records_state() {
        let (dispatcher, mut ctx) = fixture();
        ctx.set_state("current_iteration", json!(7));
        let task = test_task(json!({"rc": 0, "stdout": "3 passed", "stderr": ""}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
        assert_eq!(ctx.state_i64("last_test_rc"), Some(0));
        assert_eq!(ctx.state_i64("last_test_iteration"), Some(7));
    }

    #[tokio::test]
    async fn test_rc5_inconclusive_without_phrase() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"rc": 5, "stdout": "collected 0 items", "stderr": ""}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert!(vr.inconclusive);
        assert!(vr.should_replan);
    }

    #[tokio::test]
    async fn test_rc5_allowed_with_phrase() {
        let (dispatcher, mut ctx) = fixture();
        let mut task = test_task(json!({"rc": 5, "stdout": "", "stderr": ""}));
        task.description = "run tests (no tests expected yet)".into();
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
    }

    #[tokio::test]
    async fn test_rc4_legacy_pass() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"rc": 4, "stdout": "", "stderr": ""}));
        assert!(verify_test_execution(&task, &mut ctx, &dispatcher, 30).await.passed);
    }

    #[tokio::test]
    async fn test_nonzero_rc_fails_with_remediation() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(
            json!({"rc": 1, "stdout": "", "stderr": "Error: Cannot find module 'lodash'"}),
        );
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert_eq!(vr.details["remediation"]["module"], "lodash");
    }

    #[tokio::test]
    async fn test_zero_rc_with_error_stderr_fails() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"rc": 0, "stdout": "", "stderr": "error: assertion blew up"}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
    }

    #[tokio::test]
    async fn test_skipped_payload_after_failure_sets_blocked() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({
            "skipped": true, "kind": "skipped_tests", "last_test_rc": 1, "last_test_iteration": 4
        }));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
        assert_eq!(vr.details.get("blocked"), Some(&json!(true)));
        assert!(ctx.state_bool("tests_blocked_no_changes"));
    }

    #[tokio::test]
    async fn test_skipped_payload_after_pass() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"skipped": true, "kind": "skipped_tests", "last_test_rc": 0}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
        assert!(!vr.details.contains_key("blocked"));
    }

    #[tokio::test]
    async fn test_watch_timeout_payload_diagnosed() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({
            "rc": -1, "timeout": true, "stdout": "Watch Usage: press q to quit", "stderr": ""
        }));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert!(vr.details.contains_key("timeout_diagnosis"));
    }

    #[tokio::test]
    async fn test_blocked_payload_fails() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"blocked": ["pytest"], "rc": 0}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert!(vr.message.contains("blocked"));
    }

    #[tokio::test]
    async fn test_payload_without_rc_fails() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"stdout": "ok"}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert!(vr.message.contains("exit code"));
    }

    #[tokio::test]
    async fn test_no_payload_reuses_green_run() {
        let (dispatcher, mut ctx) = fixture();
        ctx.set_state("last_test_iteration", json!(5));
        ctx.set_state("last_test_rc", json!(0));
        ctx.set_state("last_code_change_iteration", json!(3));
        let task = Task::new(ActionKind::Test, "run tests");
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
        assert_eq!(vr.details.get("skipped"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_no_payload_no_runner_fails() {
        let (dispatcher, mut ctx) = fixture();
        let task = Task::new(ActionKind::Test, "run tests");
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(!vr.passed);
        assert!(vr.message.contains("no test runner tool"));
    }

    #[tokio::test]
    async fn test_non_pytest_command_message() {
        let (dispatcher, mut ctx) = fixture();
        let task = test_task(json!({"rc": 0, "cmd": "npm test", "stdout": "", "stderr": ""}));
        let vr = verify_test_execution(&task, &mut ctx, &dispatcher, 30).await;
        assert!(vr.passed);
        assert_eq!(vr.message, "Command succeeded");
    }
}
