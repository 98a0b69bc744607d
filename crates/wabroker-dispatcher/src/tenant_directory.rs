use std::collections::HashMap;

use wabroker_core::config::BrokerConfig;
use wabroker_core::types::{AgentId, ChatbotId, TenantId};

/// Per-tenant facts the worker needs that a `Turn` doesn't carry: which
/// agent answers for this tenant and what its outbound caps are. Built once
/// from `BrokerConfig.tenants` at startup (spec §4.2's sender map, reused
/// here rather than re-deriving it).
pub struct TenantDirectory {
    entries: HashMap<TenantId, TenantEntry>,
}

struct TenantEntry {
    chatbot_id: ChatbotId,
    agent_id: AgentId,
    daily_outbound_cap: Option<u64>,
    monthly_outbound_cap: Option<u64>,
}

impl TenantDirectory {
    pub fn from_config(config: &BrokerConfig) -> Self {
        let entries = config
            .tenants
            .iter()
            .map(|t| {
                (
                    t.tenant_id,
                    TenantEntry {
                        chatbot_id: t.chatbot_id,
                        agent_id: t.agent_id.clone(),
                        daily_outbound_cap: t.daily_outbound_cap,
                        monthly_outbound_cap: t.monthly_outbound_cap,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn chatbot_id(&self, tenant_id: TenantId) -> Option<ChatbotId> {
        self.entries.get(&tenant_id).map(|e| e.chatbot_id)
    }

    pub fn agent_id(&self, tenant_id: TenantId) -> Option<&AgentId> {
        self.entries.get(&tenant_id).map(|e| &e.agent_id)
    }

    pub fn outbound_caps(&self, tenant_id: TenantId) -> (Option<u64>, Option<u64>) {
        self.entries
            .get(&tenant_id)
            .map(|e| (e.daily_outbound_cap, e.monthly_outbound_cap))
            .unwrap_or((None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabroker_core::config::TenantBinding;
    use wabroker_core::types::ChatbotId;

    #[test]
    fn resolves_bound_tenant() {
        let mut config = BrokerConfig::default();
        config.tenants.push(TenantBinding {
            sender_msisdn: "96179374241".into(),
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(7),
            agent_id: AgentId("ecla".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: Some(3),
            monthly_outbound_cap: None,
        });
        let directory = TenantDirectory::from_config(&config);
        assert_eq!(directory.chatbot_id(TenantId(1)), Some(ChatbotId(7)));
        assert_eq!(directory.agent_id(TenantId(1)).unwrap().as_str(), "ecla");
        assert_eq!(directory.outbound_caps(TenantId(1)), (Some(3), None));
        assert_eq!(directory.chatbot_id(TenantId(99)), None);
    }
}
