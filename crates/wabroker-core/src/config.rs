use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::types::{AgentId, ChatbotId, TenantId};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";

pub const DEFAULT_DEBOUNCE_SECONDS: u64 = 3;
pub const DEBOUNCE_FLOOR_MS: u64 = 10;
pub const DEFAULT_MAX_COALESCE_SPAN_SECONDS: u64 = 10;
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_AGENT_DEADLINE_SECONDS: u64 = 60;
pub const DEFAULT_TRANSPORT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_TRANSPORT_MAX_RETRIES: u32 = 3;
pub const SSE_HEARTBEAT_SECS: u64 = 15;
pub const SSE_SUBSCRIBER_BUFFER: usize = 64;
pub const SEND_IMAGE_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const ACTION_REQUEST_DATA_MAX_BYTES: usize = 10 * 1024;
pub const GRACEFUL_SHUTDOWN_BUDGET_SECS: u64 = 15;
/// Every ingress handler caps request body size (spec §4.1) so a malformed
/// or hostile payload can't hold an async reactor task hostage.
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Top-level config (`wabroker.toml` + `WABROKER_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub transport: TransportDefaults,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    /// Sender-to-tenant bindings — the Config & Tenant Map (spec §4.2's
    /// `sender_msisdn → {tenant_id, chatbot_id, agent_id, transport_credentials}`).
    #[serde(default)]
    pub tenants: Vec<TenantBinding>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            transport: TransportDefaults::default(),
            webhooks: WebhooksConfig::default(),
            features: FeatureFlags::default(),
            tenants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Connection pool size. Must be > dispatcher worker count (§5: "the
    /// worker pool size MUST NOT exceed pool capacity minus a reservation
    /// for ingress handlers").
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// Timing and sizing knobs for the Debouncer and Dispatcher (spec §4.3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,
    #[serde(default = "default_max_coalesce_span_seconds")]
    pub max_coalesce_span_seconds: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_agent_deadline_seconds")]
    pub agent_deadline_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: DEFAULT_DEBOUNCE_SECONDS,
            max_coalesce_span_seconds: DEFAULT_MAX_COALESCE_SPAN_SECONDS,
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            agent_deadline_seconds: DEFAULT_AGENT_DEADLINE_SECONDS,
        }
    }
}

/// Default transport credentials, overridden per-tenant in `TenantBinding`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportDefaults {
    pub bsp_api_key: Option<String>,
    #[serde(default = "default_bsp_base_url")]
    pub bsp_base_url: String,
    #[serde(default = "default_transport_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_transport_max_retries")]
    pub max_retries: u32,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            bsp_api_key: None,
            bsp_base_url: default_bsp_base_url(),
            timeout_seconds: DEFAULT_TRANSPORT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_TRANSPORT_MAX_RETRIES,
        }
    }
}

/// One tenant's chatbot binding — the unit the Router looks up by
/// `sender_msisdn` (the destination number, never the customer's number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantBinding {
    pub sender_msisdn: String,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub agent_id: AgentId,
    /// Overrides `transport.bsp_api_key` / `transport.bsp_base_url` for this
    /// tenant only. Transport clients are one-per-tenant (§5) because
    /// sender credentials differ per tenant.
    pub bsp_api_key: Option<String>,
    pub bsp_base_url: Option<String>,
    #[serde(default)]
    pub daily_outbound_cap: Option<u64>,
    #[serde(default)]
    pub monthly_outbound_cap: Option<u64>,
}

/// Authentication mode for an incoming webhook source (provider catalog
/// webhook, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    HmacSha256,
    BearerToken,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    /// Shared secret for `POST /webhook/shopify` HMAC verification.
    pub shopify_webhook_secret: Option<String>,
}

/// Feature flags enumerated in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "bool_true")]
    pub enable_multi_tenant: bool,
    #[serde(default = "bool_true")]
    pub enable_usage_tracking: bool,
    #[serde(default = "bool_true")]
    pub enable_actions_center: bool,
    #[serde(default = "bool_true")]
    pub route_by_destination: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_multi_tenant: true,
            enable_usage_tracking: true,
            enable_actions_center: true,
            route_by_destination: true,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_pool_size() -> u32 {
    // dispatcher workers + a small reservation for ingress handlers
    (DEFAULT_MAX_WORKERS as u32) + 3
}
fn default_debounce_seconds() -> u64 {
    DEFAULT_DEBOUNCE_SECONDS
}
fn default_max_coalesce_span_seconds() -> u64 {
    DEFAULT_MAX_COALESCE_SPAN_SECONDS
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_agent_deadline_seconds() -> u64 {
    DEFAULT_AGENT_DEADLINE_SECONDS
}
fn default_transport_timeout_seconds() -> u64 {
    DEFAULT_TRANSPORT_TIMEOUT_SECONDS
}
fn default_transport_max_retries() -> u32 {
    DEFAULT_TRANSPORT_MAX_RETRIES
}
fn default_bsp_base_url() -> String {
    "https://api.bsp.example.com".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wabroker/wabroker.db", home)
}

impl BrokerConfig {
    /// Load config from a TOML file with `WABROKER_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, `WABROKER_CONFIG` env var,
    /// `~/.wabroker/wabroker.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("WABROKER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: BrokerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WABROKER_").split("_"))
            .extract()
            .map_err(|e| BrokerError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Startup validation (§6 CLI surface: exit code `1` on config error).
    /// Checks the invariant that `sender_msisdn` uniquely identifies one
    /// chatbot (§3) — the router depends on this.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for binding in &self.tenants {
            let normalized = crate::types::normalize_msisdn(&binding.sender_msisdn);
            if !seen.insert(normalized.clone()) {
                return Err(BrokerError::Config(format!(
                    "duplicate sender_msisdn binding: {}",
                    normalized
                )));
            }
            if binding.bsp_api_key.is_none() && self.transport.bsp_api_key.is_none() {
                return Err(BrokerError::Config(format!(
                    "tenant {} has no transport credentials (neither tenant-level nor default bsp_api_key configured)",
                    binding.tenant_id
                )));
            }
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wabroker/wabroker.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(BrokerConfig::default().validate().is_ok());
    }

    #[test]
    fn duplicate_sender_msisdn_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.transport.bsp_api_key = Some("key".into());
        cfg.tenants.push(TenantBinding {
            sender_msisdn: "+96171234567".into(),
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            agent_id: AgentId("ecla".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });
        cfg.tenants.push(TenantBinding {
            sender_msisdn: "0096171234567".into(),
            tenant_id: TenantId(2),
            chatbot_id: ChatbotId(2),
            agent_id: AgentId("astro".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_credentials_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.tenants.push(TenantBinding {
            sender_msisdn: "96171234567".into(),
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            agent_id: AgentId("ecla".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });
        assert!(cfg.validate().is_err());
    }
}
