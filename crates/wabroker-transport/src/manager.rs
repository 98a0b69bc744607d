use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use wabroker_core::config::{BrokerConfig, TenantBinding};
use wabroker_core::error::BrokerError;
use wabroker_core::types::TenantId;

use crate::bsp::BspTransport;
use crate::transport::MessagingTransport;

/// Resolves each tenant's outbound `MessagingTransport` client.
///
/// Built once from `BrokerConfig` at startup; a tenant binding with no
/// tenant-level credentials falls back to the configured transport
/// defaults, matching the precedence `BrokerConfig::validate` already
/// enforces (every tenant must resolve *some* credential pair).
pub struct TransportRegistry {
    clients: HashMap<TenantId, Arc<dyn MessagingTransport>>,
}

impl TransportRegistry {
    /// Builds one client per tenant and probes it for reachability (spec §6:
    /// "transport unreachable at startup for any tenant" aborts startup).
    /// A tenant whose BSP can't be reached at all — DNS failure, connection
    /// refused, timeout — fails the whole registry build; a non-2xx response
    /// from the probed URL still counts as reachable (see
    /// `BspTransport::probe`). This is the constructor the gateway binary
    /// uses; callers that don't want a live network check (tests wiring up
    /// the rest of the pipeline) should use `from_config_unprobed`.
    pub async fn from_config(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let registry = Self::build(config)?;
        for (tenant_id, transport) in &registry.clients {
            transport
                .probe()
                .await
                .map_err(|e| BrokerError::Transport(format!("tenant {tenant_id} BSP unreachable at startup: {e}")))?;
        }
        Ok(registry)
    }

    /// Builds one client per tenant without probing reachability. Used by
    /// tests that need a working `TransportRegistry` to wire up the
    /// dispatcher/tool layers but aren't exercising startup health checks.
    pub fn from_config_unprobed(config: &BrokerConfig) -> Result<Self, BrokerError> {
        Self::build(config)
    }

    fn build(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut clients = HashMap::new();
        let timeout = Duration::from_secs(config.transport.timeout_seconds);

        for tenant in &config.tenants {
            let (api_key, base_url) = resolve_credentials(tenant, config);
            let transport = BspTransport::new(
                tenant.sender_msisdn.clone(),
                api_key,
                base_url,
                timeout,
                config.transport.max_retries,
            )
            .map_err(|e| BrokerError::Config(format!("transport init for tenant {}: {e}", tenant.tenant_id)))?;

            info!(tenant_id = %tenant.tenant_id, sender = %tenant.sender_msisdn, "registered BSP transport");
            clients.insert(tenant.tenant_id, Arc::new(transport) as Arc<dyn MessagingTransport>);
        }

        Ok(Self { clients })
    }

    pub fn get(&self, tenant_id: TenantId) -> Option<Arc<dyn MessagingTransport>> {
        self.clients.get(&tenant_id).cloned()
    }
}

fn resolve_credentials(tenant: &TenantBinding, config: &BrokerConfig) -> (String, String) {
    // `BrokerConfig::validate` already guarantees one of these two is `Some`.
    let api_key = tenant
        .bsp_api_key
        .clone()
        .or_else(|| config.transport.bsp_api_key.clone())
        .unwrap_or_default();
    let base_url = tenant
        .bsp_base_url
        .clone()
        .unwrap_or_else(|| config.transport.bsp_base_url.clone());
    (api_key, base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_one_tenant() -> BrokerConfig {
        let mut config = BrokerConfig::default();
        config.transport.bsp_api_key = Some("default-key".to_string());
        config.transport.bsp_base_url = "https://bsp.example.com".to_string();
        config.tenants.push(TenantBinding {
            sender_msisdn: "15551234567".to_string(),
            tenant_id: TenantId(1),
            chatbot_id: wabroker_core::types::ChatbotId(1),
            agent_id: wabroker_core::types::AgentId("default".to_string()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });
        config
    }

    #[test]
    fn registry_resolves_tenant_transport() {
        let config = config_with_one_tenant();
        let registry = TransportRegistry::from_config_unprobed(&config).expect("registry builds");
        let client = registry.get(TenantId(1));
        assert!(client.is_some());
        assert!(registry.get(TenantId(99)).is_none());
    }

    // `from_config`'s probe step is exercised against a real (or mock) BSP
    // endpoint; that belongs in an integration test, not this unit module.
    #[tokio::test]
    async fn from_config_reports_unreachable_bsp_as_transport_error() {
        let mut config = config_with_one_tenant();
        config.transport.bsp_base_url = "http://127.0.0.1:1".to_string();
        let result = TransportRegistry::from_config(&config).await;
        assert!(matches!(result, Err(BrokerError::Transport(_))));
    }
}
