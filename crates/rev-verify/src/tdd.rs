use serde_json::json;

use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::task::Task;
use rev_core::verification::VerificationResult;
use rev_workspace::Workspace;

use crate::files::touched_paths;
use crate::strict::is_test_path;

pub const TDD_PENDING_GREEN: &str = "tdd_pending_green";
pub const TDD_REQUIRE_TEST: &str = "tdd_require_test";

/// What kind of files a mutating task touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    TestOnly,
    SourceOnly,
    Mixed,
    None,
}

pub fn classify_change(task: &Task, ctx: &ExecutionContext, workspace: &Workspace) -> ChangeKind {
    let paths = touched_paths(task, ctx, workspace);
    if paths.is_empty() {
        return ChangeKind::None;
    }
    let tests = paths.iter().filter(|p| is_test_path(p)).count();
    if tests == paths.len() {
        ChangeKind::TestOnly
    } else if tests == 0 {
        ChangeKind::SourceOnly
    } else {
        ChangeKind::Mixed
    }
}

/// Red/green TDD gating on top of a raw verification result.
///
/// Red phase: a failing validation after a test-only change is the point
/// of the exercise; the task passes with `tdd_expected_failure` and
/// `tdd_pending_green` is raised. A subsequent source change clears
/// pending-green and raises `tdd_require_test`, which forces the loop's
/// next iteration to run the suite.
pub fn apply_tdd_rules(
    task: &Task,
    ctx: &mut ExecutionContext,
    result: VerificationResult,
    workspace: &Workspace,
    tdd_enabled: bool,
) -> VerificationResult {
    if !tdd_enabled {
        return result;
    }

    if task.action == ActionKind::Test {
        if result.passed {
            ctx.clear_state(TDD_PENDING_GREEN);
            ctx.clear_state(TDD_REQUIRE_TEST);
            return result;
        }
        if ctx.state_bool(TDD_PENDING_GREEN) {
            return VerificationResult::pass("Failing tests are expected in the red phase")
                .with_detail("tdd_expected_failure", json!(true));
        }
        return result;
    }

    if !task.action.is_mutating() {
        return result;
    }

    match classify_change(task, ctx, workspace) {
        ChangeKind::TestOnly if !result.passed && !result.inconclusive => {
            ctx.set_state(TDD_PENDING_GREEN, json!(true));
            VerificationResult::pass("Test-only change with failing validation (red phase)")
                .with_detail("tdd_expected_failure", json!(true))
        }
        ChangeKind::SourceOnly | ChangeKind::Mixed if result.passed => {
            if ctx.state_bool(TDD_PENDING_GREEN) {
                ctx.clear_state(TDD_PENDING_GREEN);
                ctx.set_state(TDD_REQUIRE_TEST, json!(true));
            }
            result
        }
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rev_core::task::ToolEvent;
    use std::fs;
    use std::path::PathBuf;

    fn fixture() -> (Workspace, ExecutionContext, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::mem::forget(dir);
        (
            Workspace::new(root.clone()),
            ExecutionContext::new("tdd", root.clone()),
            root,
        )
    }

    fn write_task(path: &str) -> Task {
        let mut task = Task::new(ActionKind::Add, format!("add {path}"));
        task.record_tool_event(ToolEvent::new("write_file", json!({"path": path})));
        task
    }

    #[test]
    fn test_red_phase_test_only_failure_passes() {
        let (ws, mut ctx, root) = fixture();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("tests/sample.test.js"), "test('x', () => {})\n").unwrap();

        let task = write_task("tests/sample.test.js");
        let failing = VerificationResult::fail("Frontend tests failed.", true);
        let result = apply_tdd_rules(&task, &mut ctx, failing, &ws, true);

        assert!(result.passed);
        assert_eq!(result.details.get("tdd_expected_failure"), Some(&json!(true)));
        assert!(ctx.state_bool(TDD_PENDING_GREEN));
    }

    #[test]
    fn test_source_change_flips_pending_to_require_test() {
        let (ws, mut ctx, root) = fixture();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.py"), "print('hi')\n").unwrap();
        ctx.set_state(TDD_PENDING_GREEN, json!(true));

        let task = write_task("src/app.py");
        let passing = VerificationResult::pass("File created: src/app.py");
        let result = apply_tdd_rules(&task, &mut ctx, passing, &ws, true);

        assert!(result.passed);
        assert!(!ctx.state_bool(TDD_PENDING_GREEN));
        assert!(ctx.state_bool(TDD_REQUIRE_TEST));
    }

    #[test]
    fn test_failing_test_task_allowed_in_red() {
        let (ws, mut ctx, _root) = fixture();
        ctx.set_state(TDD_PENDING_GREEN, json!(true));
        let task = Task::new(ActionKind::Test, "run tests");
        let failing = VerificationResult::fail("Tests failed (rc=1)", true);
        let result = apply_tdd_rules(&task, &mut ctx, failing, &ws, true);
        assert!(result.passed);
        assert_eq!(result.details.get("tdd_expected_failure"), Some(&json!(true)));
    }

    #[test]
    fn test_passing_test_clears_flags() {
        let (ws, mut ctx, _root) = fixture();
        ctx.set_state(TDD_PENDING_GREEN, json!(true));
        ctx.set_state(TDD_REQUIRE_TEST, json!(true));
        let task = Task::new(ActionKind::Test, "run tests");
        let result = apply_tdd_rules(&task, &mut ctx, VerificationResult::pass("Tests passed"), &ws, true);
        assert!(result.passed);
        assert!(!ctx.state_bool(TDD_PENDING_GREEN));
        assert!(!ctx.state_bool(TDD_REQUIRE_TEST));
    }

    #[test]
    fn test_disabled_tdd_is_identity() {
        let (ws, mut ctx, root) = fixture();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("tests/sample.test.js"), "").unwrap();
        let task = write_task("tests/sample.test.js");
        let failing = VerificationResult::fail("Tests failed", true);
        let result = apply_tdd_rules(&task, &mut ctx, failing, &ws, false);
        assert!(!result.passed);
        assert!(!ctx.state_bool(TDD_PENDING_GREEN));
    }

    #[test]
    fn test_failing_test_without_pending_stays_failed() {
        let (ws, mut ctx, _root) = fixture();
        let task = Task::new(ActionKind::Test, "run tests");
        let failing = VerificationResult::fail("Tests failed (rc=1)", true);
        let result = apply_tdd_rules(&task, &mut ctx, failing, &ws, true);
        assert!(!result.passed);
    }

    #[test]
    fn test_classify_change() {
        let (ws, ctx, root) = fixture();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();

        let task = write_task("tests/test_a.py");
        assert_eq!(classify_change(&task, &ctx, &ws), ChangeKind::TestOnly);

        let task = write_task("src/app.py");
        assert_eq!(classify_change(&task, &ctx, &ws), ChangeKind::SourceOnly);

        let mut task = write_task("src/app.py");
        task.record_tool_event(ToolEvent::new("write_file", json!({"path": "tests/test_a.py"})));
        assert_eq!(classify_change(&task, &ctx, &ws), ChangeKind::Mixed);
    }
}
