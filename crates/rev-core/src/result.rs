use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::plan::ExecutionPlan;

/// Pipeline phase reached when a request finished (or died).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Routing,
    Planning,
    Execution,
    Verification,
    Complete,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Routing => "routing",
            Self::Planning => "planning",
            Self::Execution => "execution",
            Self::Verification => "verification",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Final outcome of one orchestrated request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub success: bool,
    pub phase_reached: AgentPhase,
    pub plan: Option<ExecutionPlan>,
    pub budget_usage: String,
    pub errors: Vec<String>,
    pub insights: BTreeMap<String, Value>,
    /// Set by circuit breakers and budget exhaustion: the outer retry
    /// loop must not try again.
    pub no_retry: bool,
    pub interrupted: bool,
}

impl OrchestratorResult {
    pub fn new() -> Self {
        Self {
            success: false,
            phase_reached: AgentPhase::Routing,
            plan: None,
            budget_usage: String::new(),
            errors: Vec::new(),
            insights: BTreeMap::new(),
            no_retry: false,
            interrupted: false,
        }
    }
}

impl Default for OrchestratorResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_result_is_failed_retryable() {
        let result = OrchestratorResult::new();
        assert!(!result.success);
        assert!(!result.no_retry);
        assert_eq!(result.phase_reached, AgentPhase::Routing);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AgentPhase::Verification.to_string(), "verification");
    }
}
