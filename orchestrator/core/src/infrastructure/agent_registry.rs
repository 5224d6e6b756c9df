// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Registry - resolves agent node ids to implementations
//
// Registration order is preserved so role lookups have a stable,
// documented tie-break: the first agent registered for a role wins.

use crate::domain::agent::{Agent, AgentConfig, AgentId, AgentRole};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentRegistryError {
    #[error("Agent '{0}' is already registered")]
    Duplicate(AgentId),
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<AgentId, Arc<dyn Agent>>,
    order: Vec<AgentId>,
}

#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<Entries>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the agent's configured id
    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<(), AgentRegistryError> {
        let id = agent.config().id.clone();
        let mut entries = self.entries.write();
        if entries.by_id.contains_key(&id) {
            return Err(AgentRegistryError::Duplicate(id));
        }
        debug!(agent_id = %id, role = %agent.config().role, "Registered agent");
        entries.order.push(id.clone());
        entries.by_id.insert(id, agent);
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.entries.read().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.entries.read().by_id.contains_key(id)
    }

    /// First registered agent with `role`
    pub fn first_by_role(&self, role: &AgentRole) -> Option<Arc<dyn Agent>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id))
            .find(|agent| &agent.config().role == role)
            .cloned()
    }

    /// Configs in registration order
    pub fn configs(&self) -> Vec<AgentConfig> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id))
            .map(|agent| agent.config().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentError, AgentOutput, AgentResult, Task};
    use crate::domain::execution::Context;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Named(AgentConfig);

    #[async_trait]
    impl Agent for Named {
        fn config(&self) -> &AgentConfig {
            &self.0
        }

        async fn process_task(
            &self,
            _task: Task,
            _context: &Context,
            _cancel: &CancellationToken,
        ) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::done(AgentResult::success()))
        }
    }

    fn agent(id: &str, role: AgentRole) -> Arc<dyn Agent> {
        Arc::new(Named(AgentConfig::new(id, id, role)))
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = AgentRegistry::new();
        registry.register(agent("codegen", AgentRole::Codegen)).unwrap();
        assert_eq!(
            registry.register(agent("codegen", AgentRole::Engineering)),
            Err(AgentRegistryError::Duplicate("codegen".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_registered_role_wins() {
        let registry = AgentRegistry::new();
        registry.register(agent("codegen-b", AgentRole::Codegen)).unwrap();
        registry.register(agent("codegen-a", AgentRole::Codegen)).unwrap();

        let found = registry.first_by_role(&AgentRole::Codegen).unwrap();
        assert_eq!(found.config().id.as_str(), "codegen-b");
        assert!(registry.first_by_role(&AgentRole::Frontend).is_none());
    }
}
