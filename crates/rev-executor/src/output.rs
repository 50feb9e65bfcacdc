use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel prefixes a sub-agent can return instead of structured output.
pub const RECOVERY_REQUESTED: &str = "[RECOVERY_REQUESTED]";
pub const FINAL_FAILURE: &str = "[FINAL_FAILURE]";
pub const USER_REJECTED: &str = "[USER_REJECTED]";

/// Evidence of one tool invocation, suitable for verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Standardized structured sub-agent output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubAgentOutput {
    pub agent_name: String,
    pub tool_name: String,
    pub tool_args: Value,
    /// Raw tool result, JSON-serialized.
    pub tool_output: String,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl SubAgentOutput {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse structured output from a task-result string.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw.trim()).ok()?;
        let obj = value.as_object()?;
        let tool_name = obj.get("tool_name")?.as_str()?.to_string();
        if tool_name.trim().is_empty() {
            return None;
        }
        Some(Self {
            agent_name: obj
                .get("agent_name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            tool_name,
            tool_args: obj.get("tool_args").cloned().unwrap_or(Value::Null),
            tool_output: match obj.get("tool_output") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            evidence: obj
                .get("evidence")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
        })
    }
}

/// What a sub-agent handed back.
#[derive(Clone, Debug)]
pub enum AgentOutcome {
    Structured(SubAgentOutput),
    /// Plain text: a sentinel-prefixed status, a tool call the model
    /// failed to emit as structured output, or free-form prose.
    Text(String),
}

impl AgentOutcome {
    pub fn structured(output: SubAgentOutput) -> Self {
        Self::Structured(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip() {
        let output = SubAgentOutput {
            agent_name: "edit-agent".into(),
            tool_name: "write_file".into(),
            tool_args: json!({"path": "a.py"}),
            tool_output: r#"{"written": true}"#.into(),
            evidence: vec![Evidence {
                artifact_ref: Some(".rev/artifacts/x.json".into()),
                summary: Some("wrote a.py".into()),
            }],
        };
        let parsed = SubAgentOutput::parse(&output.to_json()).unwrap();
        assert_eq!(parsed.tool_name, "write_file");
        assert_eq!(parsed.evidence.len(), 1);
        assert_eq!(parsed.evidence[0].summary.as_deref(), Some("wrote a.py"));
    }

    #[test]
    fn test_parse_rejects_non_tool_payloads() {
        assert!(SubAgentOutput::parse("not json").is_none());
        assert!(SubAgentOutput::parse(r#"{"foo": 1}"#).is_none());
        assert!(SubAgentOutput::parse(r#"{"tool_name": ""}"#).is_none());
    }

    #[test]
    fn test_parse_tolerates_object_tool_output() {
        let parsed =
            SubAgentOutput::parse(r#"{"tool_name": "read_file", "tool_output": {"content": "x"}}"#)
                .unwrap();
        assert!(parsed.tool_output.contains("content"));
    }
}
