use std::collections::BTreeMap;
use std::sync::Arc;

use rev_core::action::ActionKind;

use crate::SubAgent;

/// Closed action-kind → agent table, immutable after startup.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<ActionKind, Arc<dyn SubAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `agent` to every action in `actions`.
    pub fn bind(&mut self, actions: &[ActionKind], agent: Arc<dyn SubAgent>) {
        for action in actions {
            self.agents.insert(*action, agent.clone());
        }
    }

    pub fn get(&self, action: ActionKind) -> Option<Arc<dyn SubAgent>> {
        self.agents.get(&action).cloned()
    }

    pub fn registered_actions(&self) -> Vec<ActionKind> {
        self.agents.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rev_core::context::ExecutionContext;
    use rev_core::task::Task;
    use rev_tools::Dispatcher;

    use crate::output::AgentOutcome;

    struct NullAgent;

    #[async_trait]
    impl SubAgent for NullAgent {
        fn name(&self) -> &str {
            "null"
        }

        fn allowed_tools(&self) -> Vec<String> {
            Vec::new()
        }

        async fn execute(
            &self,
            _task: &Task,
            _ctx: &mut ExecutionContext,
            _dispatcher: &Dispatcher,
        ) -> anyhow::Result<AgentOutcome> {
            Ok(AgentOutcome::Text("done".into()))
        }
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry.bind(&[ActionKind::Read, ActionKind::Analyze], Arc::new(NullAgent));
        assert!(registry.get(ActionKind::Read).is_some());
        assert!(registry.get(ActionKind::Edit).is_none());
        assert_eq!(
            registry.registered_actions(),
            vec![ActionKind::Read, ActionKind::Analyze]
        );
    }
}
