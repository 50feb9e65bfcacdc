use std::collections::HashMap;

/// How the orchestrator executes a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Batch-plan the request, then execute the plan in order.
    Linear,
    /// Continuous REPL: plan one action at a time.
    SubAgent,
}

/// Post-task verification depth selected via env.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyMode {
    Off,
    /// Syntax/compile checks only.
    Fast,
    /// Compile + targeted tests + lint/type checks.
    Strict,
}

/// Runtime knobs parsed once from the environment.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub execution_mode: ExecutionMode,
    pub verify_mode: VerifyMode,
    pub tdd_enabled: bool,
    pub validation_timeout_secs: u64,
    pub tool_result_truncate_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::SubAgent,
            verify_mode: VerifyMode::Fast,
            tdd_enabled: false,
            validation_timeout_secs: 120,
            tool_result_truncate_bytes: 48_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse from process environment (`REV_EXECUTION_MODE`,
    /// `REV_VERIFY_STRICT`, `REV_VERIFY_FAST`, `REV_TDD_ENABLED`,
    /// `REV_VALIDATION_TIMEOUT_SECS`).
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Testable core of `from_env`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(mode) = vars.get("REV_EXECUTION_MODE") {
            config.execution_mode = match mode.trim().to_lowercase().as_str() {
                "linear" => ExecutionMode::Linear,
                "sub-agent" | "sub_agent" => ExecutionMode::SubAgent,
                other => {
                    tracing::warn!(mode = other, "unknown REV_EXECUTION_MODE, using sub-agent");
                    ExecutionMode::SubAgent
                }
            };
        }

        // Strict wins when both are set.
        if truthy(vars.get("REV_VERIFY_STRICT")) {
            config.verify_mode = VerifyMode::Strict;
        } else if truthy(vars.get("REV_VERIFY_FAST")) {
            config.verify_mode = VerifyMode::Fast;
        }

        config.tdd_enabled = truthy(vars.get("REV_TDD_ENABLED"));

        if let Some(secs) = vars
            .get("REV_VALIDATION_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.validation_timeout_secs = secs;
        }

        config
    }
}

fn truthy(value: Option<&String>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()),
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "on"
    )
}
