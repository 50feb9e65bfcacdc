use std::collections::HashMap;

/// Repetition threshold shared by all signature-based breakers.
pub const REPEAT_LIMIT: u32 = 3;

/// Counts normalized signatures (action, preflight, verification
/// failure) and trips after the third occurrence of the same one.
#[derive(Debug, Default)]
pub struct SignatureCounter {
    counts: HashMap<String, u32>,
}

impl SignatureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence; returns the updated count.
    pub fn record(&mut self, signature: &str) -> u32 {
        let count = self.counts.entry(signature.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Record and report whether the breaker trips.
    pub fn record_and_check(&mut self, signature: &str) -> bool {
        self.record(signature) >= REPEAT_LIMIT
    }

    pub fn count(&self, signature: &str) -> u32 {
        self.counts.get(signature).copied().unwrap_or(0)
    }
}

/// Action signature: (action, normalized description).
pub fn action_signature(action: &str, description: &str) -> String {
    format!(
        "{}::{}",
        action.trim().to_lowercase(),
        description.trim().to_lowercase()
    )
}

/// Failure signature: (action, first line of the failure message).
pub fn failure_signature(action: &str, message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim().to_lowercase();
    format!("{}::{}", action.trim().to_lowercase(), first_line)
}

/// Preflight signature: (check kind, action, joined messages).
pub fn preflight_signature(check: &str, action: &str, messages: &[String]) -> String {
    format!(
        "{check}::{}::{}",
        action.trim().to_lowercase(),
        messages.join(";").trim().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_on_third_occurrence() {
        let mut counter = SignatureCounter::new();
        let sig = action_signature("edit", "fix bug in src/app.py");
        assert!(!counter.record_and_check(&sig));
        assert!(!counter.record_and_check(&sig));
        assert!(counter.record_and_check(&sig));
    }

    #[test]
    fn test_different_signatures_do_not_interfere() {
        let mut counter = SignatureCounter::new();
        for i in 0..5 {
            assert!(!counter.record_and_check(&action_signature("edit", &format!("step {i}"))));
        }
    }

    #[test]
    fn test_signature_normalization() {
        assert_eq!(
            action_signature("EDIT", "  Fix Bug  "),
            action_signature("edit", "fix bug")
        );
        assert_eq!(
            failure_signature("test", "Tests failed (rc=1)\nlong output follows"),
            "test::tests failed (rc=1)"
        );
    }

    #[test]
    fn test_preflight_signature_includes_messages() {
        let sig = preflight_signature(
            "paths",
            "edit",
            &["missing path 'x.py' (no matches found)".to_string()],
        );
        assert!(sig.starts_with("paths::edit::"));
        assert!(sig.contains("x.py"));
    }
}
