use serde::{Deserialize, Serialize};

/// Execution strategies a request can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    QuickEdit,
    FocusedFeature,
    FullFeature,
    Refactor,
    TestFocus,
    Exploration,
    SecurityAudit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Off,
    Shallow,
    Medium,
    Deep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    None,
    Smoke,
    Targeted,
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStrictness {
    Lenient,
    Moderate,
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// The router's choice: an execution mode plus the knobs that
/// parameterize the loop. The mode never changes semantics, only which
/// verification commands run and how much research is allowed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteDecision {
    pub mode: RouteMode,
    pub research_depth: ResearchDepth,
    pub validation_mode: ValidationMode,
    pub review_strictness: ReviewStrictness,
    /// Hard-coded to 1: the core is single-threaded cooperative.
    pub parallel_workers: u32,
    pub max_retries: u32,
    pub priority: Priority,
    /// Auto-installing missing dev tools is disabled for audits.
    pub allow_auto_install: bool,
    pub reasoning: String,
}

impl RouteDecision {
    fn new(mode: RouteMode) -> Self {
        Self {
            mode,
            research_depth: ResearchDepth::Shallow,
            validation_mode: ValidationMode::Smoke,
            review_strictness: ReviewStrictness::Lenient,
            parallel_workers: 1,
            max_retries: 2,
            priority: Priority::Normal,
            allow_auto_install: true,
            reasoning: String::new(),
        }
    }
}

/// Pure keyword classifier from request text (and rough repo stats) to an
/// execution profile.
#[derive(Debug, Default)]
pub struct TaskRouter;

impl TaskRouter {
    pub fn route(&self, user_request: &str) -> RouteDecision {
        let text = user_request.to_lowercase();

        if contains_any(
            &text,
            &["security audit", "vulnerability", "cve", "exploit", "penetration test", "security scan", "threat"],
        ) {
            let mut d = RouteDecision::new(RouteMode::SecurityAudit);
            d.research_depth = ResearchDepth::Deep;
            d.validation_mode = ValidationMode::Targeted;
            d.review_strictness = ReviewStrictness::Strict;
            d.max_retries = 3;
            d.priority = Priority::Critical;
            d.allow_auto_install = false;
            d.reasoning = "Security audit requires thorough analysis and strict review".into();
            return d;
        }

        if is_test_focus(&text) {
            let mut d = RouteDecision::new(RouteMode::TestFocus);
            d.validation_mode = ValidationMode::Full;
            d.review_strictness = ReviewStrictness::Moderate;
            d.priority = Priority::High;
            d.reasoning = "Test-focused task requires validation but minimal research".into();
            return d;
        }

        if contains_any(
            &text,
            &["refactor", "cleanup", "restructure", "reorganize", "simplify", "optimize code", "improve structure", "split the classes", "split classes", "extract class"],
        ) {
            let mut d = RouteDecision::new(RouteMode::Refactor);
            d.research_depth = ResearchDepth::Deep;
            d.validation_mode = ValidationMode::Targeted;
            d.review_strictness = ReviewStrictness::Strict;
            d.max_retries = 3;
            d.priority = Priority::High;
            d.reasoning = "Refactoring requires deep analysis and careful review".into();
            return d;
        }

        if is_exploration(&text) {
            let mut d = RouteDecision::new(RouteMode::Exploration);
            d.research_depth = ResearchDepth::Deep;
            d.validation_mode = ValidationMode::None;
            d.max_retries = 1;
            d.priority = Priority::Low;
            d.reasoning = "Exploratory task focused on research and understanding".into();
            return d;
        }

        if is_feature(&text) {
            // Short single-target feature requests get the lighter profile.
            let focused = user_request.len() < 80 && count_paths(user_request) <= 1;
            let mut d = RouteDecision::new(if focused {
                RouteMode::FocusedFeature
            } else {
                RouteMode::FullFeature
            });
            d.research_depth = ResearchDepth::Medium;
            d.validation_mode = if focused {
                ValidationMode::Targeted
            } else {
                ValidationMode::Full
            };
            d.review_strictness = ReviewStrictness::Moderate;
            d.max_retries = 3;
            d.reasoning = if focused {
                "Focused feature: single target, targeted validation".into()
            } else {
                "Full feature implementation with all verification enabled".into()
            };
            return d;
        }

        let mut d = RouteDecision::new(RouteMode::QuickEdit);
        d.reasoning = "Simple quick edit with minimal overhead".into();
        d
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn is_test_focus(text: &str) -> bool {
    let has_test = contains_any(text, &["test", "testing", "coverage", "pytest"]);
    let not_feature = !contains_any(text, &["add", "build", "implement", "create", "feature"]);
    has_test && not_feature
}

fn is_feature(text: &str) -> bool {
    contains_any(
        text,
        &["add", "build", "implement", "create", "feature", "functionality", "integrate"],
    )
}

fn is_exploration(text: &str) -> bool {
    contains_any(
        text,
        &["explore", "investigate", "analyze", "research", "understand", "how does", "what is", "explain"],
    )
}

fn count_paths(text: &str) -> usize {
    text.split_whitespace().filter(|w| w.contains('/')).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(request: &str) -> RouteDecision {
        TaskRouter.route(request)
    }

    #[test]
    fn test_security_audit() {
        let d = route("run a security audit of the auth module");
        assert_eq!(d.mode, RouteMode::SecurityAudit);
        assert_eq!(d.priority, Priority::Critical);
        assert!(!d.allow_auto_install);
        assert_eq!(d.review_strictness, ReviewStrictness::Strict);
    }

    #[test]
    fn test_refactor() {
        let d = route("split the classes out of lib/analysts.py into a package");
        assert_eq!(d.mode, RouteMode::Refactor);
        assert_eq!(d.validation_mode, ValidationMode::Targeted);
        assert_eq!(d.research_depth, ResearchDepth::Deep);
    }

    #[test]
    fn test_test_focus() {
        let d = route("run the tests and fix flaky coverage reporting");
        assert_eq!(d.mode, RouteMode::TestFocus);
        assert_eq!(d.validation_mode, ValidationMode::Full);
    }

    #[test]
    fn test_exploration() {
        let d = route("explain how the order book matching works");
        assert_eq!(d.mode, RouteMode::Exploration);
        assert_eq!(d.validation_mode, ValidationMode::None);
        assert_eq!(d.priority, Priority::Low);
    }

    #[test]
    fn test_focused_vs_full_feature() {
        let d = route("add a --verbose flag to cli.py");
        assert_eq!(d.mode, RouteMode::FocusedFeature);
        let d = route(
            "implement a complete notification subsystem with email and webhook delivery, \
             retry queues in lib/notify/ and admin endpoints in api/routes/",
        );
        assert_eq!(d.mode, RouteMode::FullFeature);
        assert_eq!(d.validation_mode, ValidationMode::Full);
    }

    #[test]
    fn test_default_quick_edit() {
        let d = route("bump the version string");
        assert_eq!(d.mode, RouteMode::QuickEdit);
        assert_eq!(d.validation_mode, ValidationMode::Smoke);
    }

    #[test]
    fn test_parallel_workers_always_one() {
        for req in ["security audit", "add feature", "refactor module", "anything"] {
            assert_eq!(route(req).parallel_workers, 1);
        }
    }
}
