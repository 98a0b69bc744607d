use wabroker_core::types::{AgentId, ChatbotId, TenantId};

/// Resolved routing target for an inbound event: `(tenant_id, chatbot_id,
/// agent_id)` (spec §4.2). The transport client is looked up separately by
/// `tenant_id` — the router only resolves identity, not credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub agent_id: AgentId,
}
