use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ALL_ERROR_KINDS, ToolErrorKind};

/// Global request budget: tokens, loop steps, wallclock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub tokens_used: u64,
    pub steps: u32,
    pub wallclock_start: DateTime<Utc>,
    pub token_cap: u64,
    pub step_cap: u32,
    pub wallclock_cap_secs: u64,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            tokens_used: 0,
            steps: 0,
            wallclock_start: Utc::now(),
            token_cap: 1_000_000,
            step_cap: 60,
            wallclock_cap_secs: 3600,
        }
    }
}

impl ResourceBudget {
    pub fn with_step_cap(mut self, step_cap: u32) -> Self {
        self.step_cap = step_cap;
        self
    }

    /// Incremented at the top of every loop iteration.
    pub fn update_step(&mut self) {
        self.steps += 1;
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.tokens_used += tokens;
    }

    pub fn elapsed_secs(&self) -> u64 {
        (Utc::now() - self.wallclock_start).num_seconds().max(0) as u64
    }

    pub fn is_exceeded(&self) -> bool {
        self.tokens_used > self.token_cap
            || self.steps > self.step_cap
            || self.elapsed_secs() > self.wallclock_cap_secs
    }

    pub fn usage_summary(&self) -> String {
        format!(
            "steps {}/{}, tokens {}/{}, elapsed {}s/{}s",
            self.steps,
            self.step_cap,
            self.tokens_used,
            self.token_cap,
            self.elapsed_secs(),
            self.wallclock_cap_secs
        )
    }
}

/// Per-error-kind retry counters. A verification failure classified as
/// kind `k` decrements `k`'s counter; at zero the per-kind circuit trips.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryBudgets {
    remaining: BTreeMap<ToolErrorKind, u32>,
}

impl Default for RecoveryBudgets {
    fn default() -> Self {
        Self {
            remaining: ALL_ERROR_KINDS
                .iter()
                .map(|k| (*k, k.default_recovery_budget()))
                .collect(),
        }
    }
}

impl RecoveryBudgets {
    pub fn remaining(&self, kind: ToolErrorKind) -> u32 {
        self.remaining.get(&kind).copied().unwrap_or(0)
    }

    /// Decrement the counter for `kind`; returns the remaining budget.
    /// Zero means the circuit for this kind must trip.
    pub fn consume(&mut self, kind: ToolErrorKind) -> u32 {
        let entry = self
            .remaining
            .entry(kind)
            .or_insert_with(|| kind.default_recovery_budget());
        *entry = entry.saturating_sub(1);
        *entry
    }

    pub fn exhausted(&self, kind: ToolErrorKind) -> bool {
        self.remaining(kind) == 0
    }
}
