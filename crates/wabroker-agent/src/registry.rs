use std::sync::Arc;

use dashmap::DashMap;
use wabroker_core::types::AgentId;

use crate::agent::Agent;
use crate::error::{AgentError, Result};

/// Maps `agent_id -> Agent` (spec §4.5). Built once at startup from the
/// tenant bindings' `agent_id`s and whatever concrete `Agent` implementations
/// the deployment registers; reads are lock-free via `DashMap`.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { agents: DashMap::new() }
    }

    pub fn register(&self, agent_id: AgentId, agent: Arc<dyn Agent>) {
        self.agents.insert(agent_id.as_str().to_string(), agent);
    }

    pub fn get(&self, agent_id: &AgentId) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(agent_id.as_str())
            .map(|entry| entry.clone())
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::EchoAgent;

    #[test]
    fn unregistered_agent_is_unknown() {
        let registry = AgentRegistry::new();
        assert!(registry.get(&AgentId("ecla".into())).is_err());
    }

    #[test]
    fn registered_agent_is_found_by_id() {
        let registry = AgentRegistry::new();
        registry.register(AgentId("ecla".into()), Arc::new(EchoAgent::new("ecla")));
        assert!(registry.get(&AgentId("ecla".into())).is_ok());
    }
}
