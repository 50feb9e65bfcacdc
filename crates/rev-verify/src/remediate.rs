use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

static MISSING_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)cannot find module '([^']+)'|modulenotfounderror: no module named '([^']+)'|module not found"#)
        .unwrap()
});

static MISSING_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)missing script:?\s*"?([a-z0-9:_-]+)"?"#).unwrap());

const ERROR_KEYWORDS: &[&str] = &["error:", "traceback (most recent call last)", "fatal:", "panicked at"];

/// Structured remediation hints for a failed (or suspicious) `run_cmd`.
///
/// A zero exit code with error-level stderr output is still treated as a
/// failure signal; shells and wrappers routinely swallow exit codes.
pub fn remediation_for_run(rc: i64, _stdout: &str, stderr: &str) -> Option<Value> {
    let stderr_lower = stderr.to_lowercase();

    if let Some(caps) = MISSING_MODULE.captures(&stderr_lower) {
        let module = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Some(json!({
            "kind": "missing_module",
            "module": module,
            "hint": if module.is_empty() {
                "Install the missing dependency, then re-run".to_string()
            } else {
                format!("Install the missing dependency '{module}', then re-run")
            },
        }));
    }

    if let Some(caps) = MISSING_SCRIPT.captures(&stderr_lower) {
        return Some(json!({
            "kind": "missing_script",
            "script": caps.get(1).map(|m| m.as_str()).unwrap_or(""),
            "hint": "The npm script does not exist; check package.json scripts or use the runner directly",
        }));
    }

    if rc == 0 && ERROR_KEYWORDS.iter().any(|k| stderr_lower.contains(k)) {
        return Some(json!({
            "kind": "stderr_errors_with_zero_rc",
            "hint": "Command exited 0 but stderr contains error-level output; treat as failed",
        }));
    }

    None
}

/// True when stderr makes a zero exit code untrustworthy.
pub fn stderr_contradicts_success(rc: i64, stderr: &str) -> bool {
    rc == 0 && {
        let lower = stderr.to_lowercase();
        ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_missing_module() {
        let r = remediation_for_run(1, "", "Error: Cannot find module 'express'").unwrap();
        assert_eq!(r["kind"], "missing_module");
        assert_eq!(r["module"], "express");
    }

    #[test]
    fn test_python_missing_module() {
        let r = remediation_for_run(1, "", "ModuleNotFoundError: No module named 'requests'").unwrap();
        assert_eq!(r["module"], "requests");
    }

    #[test]
    fn test_missing_npm_script() {
        let r = remediation_for_run(1, "", "npm ERR! Missing script: \"test\"").unwrap();
        assert_eq!(r["kind"], "missing_script");
    }

    #[test]
    fn test_zero_rc_with_stderr_errors() {
        let r = remediation_for_run(0, "", "error: something exploded").unwrap();
        assert_eq!(r["kind"], "stderr_errors_with_zero_rc");
        assert!(stderr_contradicts_success(0, "error: boom"));
        assert!(!stderr_contradicts_success(0, "warning: meh"));
        assert!(!stderr_contradicts_success(1, "error: boom"));
    }

    #[test]
    fn test_clean_run_no_remediation() {
        assert!(remediation_for_run(0, "ok", "").is_none());
    }
}
