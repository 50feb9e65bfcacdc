use serde_json::{json, Value};

/// Watch-mode stdout signatures from test runners that never exit.
const WATCH_PATTERNS: &[&str] = &[
    "watching for file changes",
    "press q to quit",
    "watch usage",
    "waiting for file changes",
];

/// Diagnose a test command that timed out because the runner sat in watch
/// mode. Returns a structured diagnosis with a two-task remediation:
/// first edit package.json to disable watch, then re-run the tests.
pub fn diagnose_watch_timeout(rc: i64, stdout: &str) -> Option<Value> {
    if rc != -1 {
        return None;
    }
    let lower = stdout.to_lowercase();
    if !WATCH_PATTERNS.iter().any(|p| lower.contains(p)) {
        return None;
    }
    Some(json!({
        "kind": "watch_mode_timeout",
        "summary": "Test command never exited: the runner is in watch mode",
        "remediation_tasks": [
            {
                "action": "edit",
                "description": "Edit package.json so the test script runs once: add --run for vitest, \
                                --watchAll=false for jest, or --no-watch as appropriate"
            },
            {
                "action": "test",
                "description": "Re-run the test suite after disabling watch mode"
            }
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jest_watch_usage() {
        let diagnosis = diagnose_watch_timeout(-1, "Watch Usage\n > Press f to run only failed tests.").unwrap();
        assert_eq!(diagnosis["kind"], "watch_mode_timeout");
        assert_eq!(diagnosis["remediation_tasks"].as_array().unwrap().len(), 2);
        assert_eq!(diagnosis["remediation_tasks"][0]["action"], "edit");
        assert_eq!(diagnosis["remediation_tasks"][1]["action"], "test");
    }

    #[test]
    fn test_vitest_watching() {
        assert!(diagnose_watch_timeout(-1, "PASS  Waiting for file changes...").is_some());
        assert!(diagnose_watch_timeout(-1, "press q to quit").is_some());
    }

    #[test]
    fn test_normal_failure_is_not_watch() {
        assert!(diagnose_watch_timeout(1, "Watch Usage").is_none());
        assert!(diagnose_watch_timeout(-1, "2 tests failed").is_none());
    }
}
