use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of verifying one completed task.
///
/// `passed && inconclusive` is unrepresentable through the constructors;
/// `!passed && !should_replan` means the failure is fatal and the loop
/// must not continue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub inconclusive: bool,
    pub message: String,
    pub details: BTreeMap<String, Value>,
    pub should_replan: bool,
}

impl VerificationResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            inconclusive: false,
            message: message.into(),
            details: BTreeMap::new(),
            should_replan: false,
        }
    }

    pub fn fail(message: impl Into<String>, should_replan: bool) -> Self {
        Self {
            passed: false,
            inconclusive: false,
            message: message.into(),
            details: BTreeMap::new(),
            should_replan,
        }
    }

    /// No evidence of failure, but no evidence of correctness either.
    /// The loop answers by injecting a targeted test task.
    pub fn inconclusive(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            inconclusive: true,
            message: message.into(),
            details: BTreeMap::new(),
            should_replan: true,
        }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    pub fn is_fatal(&self) -> bool {
        !self.passed && !self.should_replan
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.passed { "[OK]" } else { "[FAIL]" };
        write!(f, "{status} {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pass_is_conclusive() {
        let vr = VerificationResult::pass("ok");
        assert!(vr.passed && !vr.inconclusive && !vr.should_replan);
    }

    #[test]
    fn test_inconclusive_always_replans() {
        let vr = VerificationResult::inconclusive("no validation step defined");
        assert!(!vr.passed && vr.inconclusive && vr.should_replan);
        assert!(!vr.is_fatal());
    }

    #[test]
    fn test_fatal_fail() {
        let vr = VerificationResult::fail("budget exhausted", false);
        assert!(vr.is_fatal());
    }

    #[test]
    fn test_details_round_trip() {
        let vr = VerificationResult::fail("bad", true).with_detail("file_path", json!("a.py"));
        assert_eq!(vr.detail_str("file_path"), Some("a.py"));
    }

    #[test]
    fn test_display() {
        assert_eq!(VerificationResult::pass("done").to_string(), "[OK] done");
        assert_eq!(
            VerificationResult::fail("nope", true).to_string(),
            "[FAIL] nope"
        );
    }
}
