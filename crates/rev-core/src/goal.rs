use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Achieved,
    Failed,
    PartiallyAchieved,
}

/// A measurable metric for goal achievement.
///
/// `target`/`current` are JSON values so the same metric type covers
/// booleans ("tests_pass"), numeric thresholds ("coverage_delta"), and
/// string expectations ("no high severity").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoalMetric {
    pub name: String,
    pub target: Value,
    pub current: Option<Value>,
    pub passed: bool,
}

impl GoalMetric {
    pub fn new(name: impl Into<String>, target: Value) -> Self {
        Self {
            name: name.into(),
            target,
            current: None,
            passed: false,
        }
    }

    /// Evaluate target vs current. Numeric targets pass on `current >=
    /// target`; booleans on equality; strings on case-insensitive
    /// substring; anything else on exact equality.
    pub fn evaluate(&mut self) -> bool {
        let Some(current) = &self.current else {
            self.passed = false;
            return false;
        };

        self.passed = match &self.target {
            Value::Bool(target) => current.as_bool() == Some(*target),
            Value::Number(target) => match (current.as_f64(), target.as_f64()) {
                (Some(cur), Some(tgt)) => cur >= tgt,
                _ => false,
            },
            Value::String(target) => {
                let cur = match current {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                cur.to_lowercase().contains(&target.to_lowercase())
            }
            other => current == other,
        };
        self.passed
    }
}

/// An explicit objective with measurable success criteria.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    pub metrics: Vec<GoalMetric>,
    pub status: GoalStatus,
    pub priority: i32,
    pub notes: Vec<String>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            metrics: Vec::new(),
            status: GoalStatus::Pending,
            priority: 0,
            notes: Vec::new(),
        }
    }

    pub fn add_metric(&mut self, name: &str, target: Value) -> &mut GoalMetric {
        self.metrics.push(GoalMetric::new(name, target));
        self.metrics.last_mut().unwrap()
    }

    /// Evaluate all metrics: achieved iff all pass, failed iff none pass,
    /// partial otherwise. Goals without metrics keep their current status.
    pub fn evaluate(&mut self) -> GoalStatus {
        if self.metrics.is_empty() {
            return self.status;
        }
        let passed = self
            .metrics
            .iter_mut()
            .map(|m| m.evaluate())
            .filter(|ok| *ok)
            .count();
        self.status = if passed == self.metrics.len() {
            GoalStatus::Achieved
        } else if passed == 0 {
            GoalStatus::Failed
        } else {
            GoalStatus::PartiallyAchieved
        };
        self.status
    }

    pub fn is_achieved(&mut self) -> bool {
        self.evaluate() == GoalStatus::Achieved
    }

    pub fn summary(&self) -> String {
        let passed = self.metrics.iter().filter(|m| m.passed).count();
        format!(
            "{} ({}/{} metrics passed)",
            self.description,
            passed,
            self.metrics.len()
        )
    }
}

/// Derive default goals for a request given the plan's action mix.
pub fn derive_goals(user_request: &str, mutates_code: bool) -> Vec<Goal> {
    let request = user_request.to_lowercase();
    let mut goals = Vec::new();

    let mut completion = Goal::new("Complete all tasks successfully");
    completion.add_metric("all_tasks_completed", Value::Bool(true));
    goals.push(completion);

    if mutates_code {
        let mut tests = Goal::new("Ensure tests pass after changes");
        tests.add_metric("tests_pass", Value::Bool(true));
        tests.add_metric("coverage_delta", Value::from(0));
        goals.push(tests);
    }

    if ["security", "auth", "password", "token"].iter().any(|w| request.contains(w)) {
        let mut security = Goal::new("Maintain security standards");
        security.add_metric("no_high_severity_findings", Value::Bool(true));
        security.add_metric("no_exposed_secrets", Value::Bool(true));
        goals.push(security);
    }

    if ["database", "migration", "schema"].iter().any(|w| request.contains(w)) {
        let mut db = Goal::new("Database changes are safe and reversible");
        db.add_metric("migration_reversible", Value::Bool(true));
        goals.push(db);
    }

    goals
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_bool() {
        let mut m = GoalMetric::new("tests_pass", json!(true));
        m.current = Some(json!(true));
        assert!(m.evaluate());
        m.current = Some(json!(false));
        assert!(!m.evaluate());
    }

    #[test]
    fn test_metric_numeric_threshold() {
        let mut m = GoalMetric::new("coverage_delta", json!(0));
        m.current = Some(json!(5));
        assert!(m.evaluate());
        m.current = Some(json!(-1));
        assert!(!m.evaluate());
        m.current = Some(json!(0));
        assert!(m.evaluate());
    }

    #[test]
    fn test_metric_string_substring_case_insensitive() {
        let mut m = GoalMetric::new("severity", json!("no high severity"));
        m.current = Some(json!("Scan result: NO HIGH SEVERITY findings"));
        assert!(m.evaluate());
        m.current = Some(json!("2 high severity findings"));
        assert!(!m.evaluate());
    }

    #[test]
    fn test_metric_missing_current_fails() {
        let mut m = GoalMetric::new("x", json!(true));
        assert!(!m.evaluate());
    }

    #[test]
    fn test_goal_statuses() {
        let mut g = Goal::new("g");
        g.add_metric("a", json!(true)).current = Some(json!(true));
        g.add_metric("b", json!(true)).current = Some(json!(true));
        assert_eq!(g.evaluate(), GoalStatus::Achieved);

        g.metrics[1].current = Some(json!(false));
        assert_eq!(g.evaluate(), GoalStatus::PartiallyAchieved);

        g.metrics[0].current = Some(json!(false));
        assert_eq!(g.evaluate(), GoalStatus::Failed);
    }

    #[test]
    fn test_goal_without_metrics_keeps_status() {
        let mut g = Goal::new("g");
        assert_eq!(g.evaluate(), GoalStatus::Pending);
    }

    #[test]
    fn test_derive_goals_for_coding_request() {
        let goals = derive_goals("add a login endpoint with password auth", true);
        assert!(goals.iter().any(|g| g.description.contains("Complete all tasks")));
        assert!(goals.iter().any(|g| g.description.contains("tests pass")));
        assert!(goals.iter().any(|g| g.description.contains("security")));
    }

    #[test]
    fn test_derive_goals_read_only_request() {
        let goals = derive_goals("explain the module layout", false);
        assert_eq!(goals.len(), 1);
    }
}
