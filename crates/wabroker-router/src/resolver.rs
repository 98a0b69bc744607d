use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{info, warn};
use wabroker_core::config::BrokerConfig;
use wabroker_core::types::normalize_msisdn;

use crate::error::{Result, RouterError};
use crate::types::RouteTarget;

/// Destination-MSISDN → tenant binding map — the Config & Tenant Map (spec
/// §4.2). Read-mostly: built once at startup from `BrokerConfig::tenants`
/// and swapped wholesale on reload rather than mutated entry-by-entry
/// (spec §5: "reloaded atomically on SIGHUP-equivalent signals").
pub struct Router {
    bindings: RwLock<HashMap<String, RouteTarget>>,
}

impl Router {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            bindings: RwLock::new(build_bindings(config)),
        }
    }

    pub fn reload(&self, config: &BrokerConfig) {
        let fresh = build_bindings(config);
        let count = fresh.len();
        *self.bindings.write().unwrap() = fresh;
        info!(bindings = count, "router tenant map reloaded");
    }

    /// Resolves `(tenant_id, chatbot_id, agent_id)` by the event's
    /// *destination* number — never the customer's sender number (spec
    /// §4.2). Two tenants may legitimately share a contact's MSISDN as
    /// sender; only the destination disambiguates them.
    pub fn resolve(&self, destination_msisdn: &str) -> Result<RouteTarget> {
        let normalized = normalize_msisdn(destination_msisdn);
        self.bindings
            .read()
            .unwrap()
            .get(&normalized)
            .cloned()
            .ok_or_else(|| {
                warn!(destination = %normalized, "unroutable inbound event; dead-lettering");
                RouterError::Unroutable {
                    destination: normalized.clone(),
                }
            })
    }
}

fn build_bindings(config: &BrokerConfig) -> HashMap<String, RouteTarget> {
    config
        .tenants
        .iter()
        .map(|t| {
            let normalized = normalize_msisdn(&t.sender_msisdn);
            (
                normalized,
                RouteTarget {
                    tenant_id: t.tenant_id,
                    chatbot_id: t.chatbot_id,
                    agent_id: t.agent_id.clone(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabroker_core::config::TenantBinding;
    use wabroker_core::types::{AgentId, ChatbotId, TenantId};

    fn cfg_with(bindings: Vec<(&str, i64, i64, &str)>) -> BrokerConfig {
        let mut cfg = BrokerConfig::default();
        cfg.transport.bsp_api_key = Some("key".into());
        for (sender, tenant, chatbot, agent) in bindings {
            cfg.tenants.push(TenantBinding {
                sender_msisdn: sender.into(),
                tenant_id: TenantId(tenant),
                chatbot_id: ChatbotId(chatbot),
                agent_id: AgentId(agent.into()),
                bsp_api_key: None,
                bsp_base_url: None,
                daily_outbound_cap: None,
                monthly_outbound_cap: None,
            });
        }
        cfg
    }

    #[test]
    fn resolves_by_destination_not_sender() {
        let cfg = cfg_with(vec![
            ("96179374241", 1, 1, "ecla"),
            ("9613451652", 2, 2, "astro"),
        ]);
        let router = Router::from_config(&cfg);

        let a = router.resolve("96179374241").unwrap();
        assert_eq!(a.tenant_id, TenantId(1));
        assert_eq!(a.agent_id.as_str(), "ecla");

        let b = router.resolve("9613451652").unwrap();
        assert_eq!(b.tenant_id, TenantId(2));
        assert_eq!(b.agent_id.as_str(), "astro");
    }

    #[test]
    fn normalizes_destination_before_lookup() {
        let cfg = cfg_with(vec![("96179374241", 1, 1, "ecla")]);
        let router = Router::from_config(&cfg);
        assert!(router.resolve("+96179374241").is_ok());
        assert!(router.resolve("0096179374241").is_ok());
    }

    #[test]
    fn unknown_destination_is_unroutable() {
        let cfg = cfg_with(vec![("96179374241", 1, 1, "ecla")]);
        let router = Router::from_config(&cfg);
        assert!(router.resolve("000000").is_err());
    }

    #[test]
    fn reload_replaces_bindings_atomically() {
        let cfg = cfg_with(vec![("96179374241", 1, 1, "ecla")]);
        let router = Router::from_config(&cfg);
        let cfg2 = cfg_with(vec![("9613451652", 2, 2, "astro")]);
        router.reload(&cfg2);
        assert!(router.resolve("96179374241").is_err());
        assert!(router.resolve("9613451652").is_ok());
    }
}
