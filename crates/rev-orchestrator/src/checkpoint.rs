use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use rev_core::context::ExecutionContext;
use rev_core::plan::ExecutionPlan;

/// Resumable snapshot of one request's progress, written after each loop
/// iteration. Resume is explicit (a flag on the request); the loop never
/// goes looking for checkpoints on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub user_request: String,
    pub iteration: u32,
    pub plan: Option<ExecutionPlan>,
    pub agent_state: BTreeMap<String, Value>,
    pub work_history: Vec<String>,
    pub steps_used: u32,
    pub tokens_used: u64,
}

impl Checkpoint {
    pub fn capture(session_id: &str, iteration: u32, ctx: &ExecutionContext) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_request: ctx.user_request.clone(),
            iteration,
            plan: ctx.plan.clone(),
            agent_state: ctx.agent_state.clone(),
            work_history: ctx.work_history.clone(),
            steps_used: ctx.budget.steps,
            tokens_used: ctx.budget.tokens_used,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create session dir: {}", parent.display()))?;
        }
        let serialized =
            serde_json::to_string_pretty(self).context("failed to serialize checkpoint")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)
            .with_context(|| format!("failed to write checkpoint: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace checkpoint: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read checkpoint: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid checkpoint: {}", path.display()))
    }

    /// Restore history and ephemeral state onto a fresh context.
    pub fn restore_into(&self, ctx: &mut ExecutionContext) {
        ctx.plan = self.plan.clone();
        ctx.agent_state = self.agent_state.clone();
        ctx.work_history = self.work_history.clone();
        ctx.budget.steps = self.steps_used;
        ctx.budget.tokens_used = self.tokens_used;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions/01A/checkpoint.json");

        let mut ctx = ExecutionContext::new("do things", PathBuf::from("/ws"));
        ctx.set_state("last_test_rc", json!(0));
        ctx.record_work("[COMPLETED] [READ] looked at lib/");
        ctx.budget.update_step();

        let checkpoint = Checkpoint::capture("01A", 4, &ctx);
        checkpoint.save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.iteration, 4);
        assert_eq!(loaded.session_id, "01A");

        let mut restored = ExecutionContext::new("do things", PathBuf::from("/ws"));
        loaded.restore_into(&mut restored);
        assert_eq!(restored.state_i64("last_test_rc"), Some(0));
        assert_eq!(restored.work_history.len(), 1);
        assert_eq!(restored.budget.steps, 1);
    }

    #[test]
    fn test_load_missing_is_error() {
        assert!(Checkpoint::load(Path::new("/nonexistent/checkpoint.json")).is_err());
    }
}
