use std::sync::{Arc, RwLock};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use wabroker_agent::{AgentRegistry, ToolExecutor, UsageGuard};
use wabroker_core::config::{BrokerConfig, MAX_REQUEST_BODY_BYTES};
use wabroker_dispatcher::{InFlightSet, TenantDirectory, WorkerPool};
use wabroker_router::Router as TenantRouter;
use wabroker_store::Store;
use wabroker_transport::TransportRegistry;

/// Central shared state — passed as `Arc<AppState>` to all Axum handlers.
///
/// `config` lives behind a `RwLock` rather than being copied into each
/// collaborator because the SIGHUP reload path (spec §5: "reloaded
/// atomically") swaps it in place; `tenant_router` reloads its own bindings
/// the same way through its interior lock.
pub struct AppState {
    pub config: RwLock<BrokerConfig>,
    pub store: Arc<Store>,
    pub tenant_router: Arc<TenantRouter>,
    pub debouncer: Arc<wabroker_debounce::Debouncer>,
    pub pool: Arc<WorkerPool>,
    pub transport: Arc<TransportRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolExecutor>,
    pub usage: Arc<UsageGuard>,
    pub directory: Arc<TenantDirectory>,
    pub in_flight: Arc<InFlightSet>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        config: BrokerConfig,
        store: Arc<Store>,
        tenant_router: Arc<TenantRouter>,
        debouncer: Arc<wabroker_debounce::Debouncer>,
        pool: Arc<WorkerPool>,
        transport: Arc<TransportRegistry>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolExecutor>,
        usage: Arc<UsageGuard>,
        directory: Arc<TenantDirectory>,
        in_flight: Arc<InFlightSet>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            store,
            tenant_router,
            debouncer,
            pool,
            transport,
            agents,
            tools,
            usage,
            directory,
            in_flight,
        }
    }
}

/// Assemble the full Axum router (spec §4.1's four webhook endpoints plus
/// the Broadcast Hub subscription and liveness probe).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(crate::http::webhooks::bsp_webhook_handler))
        .route(
            "/manual-message",
            post(crate::http::webhooks::manual_message_handler),
        )
        .route(
            "/action-feedback",
            post(crate::http::webhooks::action_feedback_handler),
        )
        .route(
            "/webhook/shopify",
            post(crate::http::webhooks::shopify_webhook_handler),
        )
        .route("/stream", get(crate::http::stream::stream_handler))
        .route("/health", get(crate::http::health::health_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
