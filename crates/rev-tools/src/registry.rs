use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use rev_core::error::ToolError;

/// One workspace capability. Implement this to add a tool; register it in
/// the registry the orchestrator is built with.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "read_file", "run_cmd").
    fn name(&self) -> &str;

    /// Human-readable description advertised to the planner.
    fn description(&self) -> &str;

    /// JSON schema for the argument object.
    fn input_schema(&self) -> Value;

    /// Whether this tool only reads state.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Execute with already-normalized, schema-valid arguments.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Static name → tool map, immutable after startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description, schema) triples for planner advertisement.
    pub fn schemas(&self) -> Vec<(String, String, Value)> {
        let mut out: Vec<_> = self
            .tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.input_schema()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
