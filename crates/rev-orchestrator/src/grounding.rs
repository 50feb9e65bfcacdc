use serde::{Deserialize, Serialize};

/// What the anchoring score recommends next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchoringDecision {
    /// Evidence has shifted the posterior enough; accept completion.
    Stop,
    /// Evidence density is too low; force more research.
    ReSearch,
    /// Too many conflicting anchors; force a structural check.
    Debate,
}

#[derive(Clone, Debug)]
pub struct AnchoringMetrics {
    pub evidence_density: f64,
    pub mismatch_risk: u32,
    pub raw_score: f64,
    pub decision: AnchoringDecision,
}

/// Evidence-anchoring score over recent work history.
///
/// Score = density * (1 + log_b(1 + tools_used)) / (1 + risk * penalty).
/// The weights are heuristic tunables, not contracts.
#[derive(Clone, Debug)]
pub struct AnchoringScorer {
    pub density_weight: f64,
    pub risk_penalty: f64,
    pub budget_log_base: f64,
    pub stop_threshold: f64,
    pub debate_risk_threshold: u32,
}

impl Default for AnchoringScorer {
    fn default() -> Self {
        Self {
            density_weight: 1.0,
            risk_penalty: 2.0,
            budget_log_base: 10.0,
            stop_threshold: 0.8,
            debate_risk_threshold: 3,
        }
    }
}

impl AnchoringScorer {
    pub fn compute(
        &self,
        claims: usize,
        repo_citations: usize,
        test_outputs: usize,
        unresolved_symbols: usize,
        missing_files: usize,
        tools_used: usize,
    ) -> AnchoringMetrics {
        let claims = claims.max(1) as f64;
        let evidence_density = (repo_citations + test_outputs) as f64 / claims;
        let mismatch_risk = (unresolved_symbols + missing_files) as u32;

        let budget_factor = (1.0 + tools_used as f64).log(self.budget_log_base);
        let numerator = self.density_weight * evidence_density * (1.0 + budget_factor);
        let denominator = 1.0 + (mismatch_risk as f64 * self.risk_penalty);
        let raw_score = numerator / denominator;

        let decision = if mismatch_risk >= self.debate_risk_threshold {
            AnchoringDecision::Debate
        } else if raw_score >= self.stop_threshold {
            AnchoringDecision::Stop
        } else {
            AnchoringDecision::ReSearch
        };

        AnchoringMetrics {
            evidence_density,
            mismatch_risk,
            raw_score,
            decision,
        }
    }
}

/// Completion-grounding evidence extracted from work-history lines.
#[derive(Debug, Clone, Default)]
pub struct GroundingEvidence {
    pub action_steps: usize,
    pub research_steps: usize,
    pub test_outputs: usize,
    pub completed_claims: usize,
}

const ACTION_MARKERS: &[&str] = &[
    "[edit]", "[add]", "[create]", "[refactor]", "[create_directory]", "[rename]", "[delete]", "[fix]",
];
const RESEARCH_MARKERS: &[&str] =
    &["[read]", "[analyze]", "[review]", "[research]", "[investigate]"];

/// Scan work-history lines (as the loop records them, e.g.
/// "[COMPLETED] [EDIT] fix the parser") for grounding evidence.
pub fn collect_evidence(work_history: &[String]) -> GroundingEvidence {
    let mut evidence = GroundingEvidence::default();
    for line in work_history {
        let lower = line.to_lowercase();
        let completed = lower.starts_with("[completed]");
        // Inconclusive outcomes still performed their write; the injected
        // test validates them afterwards.
        let counts_as_work = completed || lower.starts_with("[inconclusive]");
        if !counts_as_work {
            continue;
        }
        if completed {
            evidence.completed_claims += 1;
        }
        if ACTION_MARKERS.iter().any(|m| lower.contains(m)) {
            evidence.action_steps += 1;
        }
        if RESEARCH_MARKERS.iter().any(|m| lower.contains(m)) {
            evidence.research_steps += 1;
        }
        if completed && (lower.contains("[test]") || lower.contains("tests passed")) {
            evidence.test_outputs += 1;
        }
    }
    evidence
}

/// A claimed completion is grounded when the history shows research
/// evidence, and (for code-changing requests) at least one concrete
/// action as well.
pub fn is_completion_grounded(evidence: &GroundingEvidence, requires_action: bool) -> (bool, &'static str) {
    if evidence.research_steps == 0 {
        return (false, "no research/read evidence in work history");
    }
    if requires_action && evidence.action_steps == 0 {
        return (false, "no concrete action (edit/write/refactor) in work history");
    }
    (true, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> AnchoringScorer {
        AnchoringScorer::default()
    }

    #[test]
    fn test_high_risk_forces_debate() {
        let metrics = scorer().compute(4, 10, 2, 2, 1, 5);
        assert_eq!(metrics.mismatch_risk, 3);
        assert_eq!(metrics.decision, AnchoringDecision::Debate);
    }

    #[test]
    fn test_dense_evidence_stops() {
        let metrics = scorer().compute(2, 6, 2, 0, 0, 8);
        assert!(metrics.raw_score >= 0.8, "score {}", metrics.raw_score);
        assert_eq!(metrics.decision, AnchoringDecision::Stop);
    }

    #[test]
    fn test_sparse_evidence_researches() {
        let metrics = scorer().compute(10, 1, 0, 0, 0, 1);
        assert_eq!(metrics.decision, AnchoringDecision::ReSearch);
    }

    #[test]
    fn test_score_monotonic_in_evidence() {
        let s = scorer();
        let low = s.compute(5, 1, 0, 0, 0, 3).raw_score;
        let high = s.compute(5, 4, 1, 0, 0, 3).raw_score;
        assert!(high > low);
    }

    #[test]
    fn test_score_monotonic_in_risk() {
        let s = scorer();
        let safe = s.compute(5, 4, 1, 0, 0, 3).raw_score;
        let risky = s.compute(5, 4, 1, 2, 0, 3).raw_score;
        assert!(risky < safe);
    }

    #[test]
    fn test_zero_claims_does_not_divide_by_zero() {
        let metrics = scorer().compute(0, 0, 0, 0, 0, 0);
        assert!(metrics.raw_score.is_finite());
    }

    #[test]
    fn test_collect_evidence_and_grounding() {
        let history = vec![
            "[COMPLETED] [READ] read lib/analysts.py".to_string(),
            "[COMPLETED] [EDIT] split the classes".to_string(),
            "[FAILED] [TEST] run tests | Reason: rc=1".to_string(),
            "[COMPLETED] [TEST] run tests".to_string(),
        ];
        let evidence = collect_evidence(&history);
        assert_eq!(evidence.research_steps, 1);
        assert_eq!(evidence.action_steps, 1);
        assert_eq!(evidence.test_outputs, 1);
        assert_eq!(evidence.completed_claims, 3);

        assert!(is_completion_grounded(&evidence, true).0);
    }

    #[test]
    fn test_ungrounded_without_action_or_research() {
        let only_reads = collect_evidence(&["[COMPLETED] [READ] looked around".to_string()]);
        let (ok, reason) = is_completion_grounded(&only_reads, true);
        assert!(!ok);
        assert!(reason.contains("action"));
        // Read-only requests do not require an action step.
        assert!(is_completion_grounded(&only_reads, false).0);

        let only_edits = collect_evidence(&["[COMPLETED] [EDIT] changed stuff".to_string()]);
        let (ok, reason) = is_completion_grounded(&only_edits, true);
        assert!(!ok);
        assert!(reason.contains("research"));
    }
}
