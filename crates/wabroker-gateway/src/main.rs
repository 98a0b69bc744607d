use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{error, info, warn};
use wabroker_agent::{AgentRegistry, EchoAgent, ToolExecutor, UsageGuard};
use wabroker_core::config::{BrokerConfig, GRACEFUL_SHUTDOWN_BUDGET_SECS};
use wabroker_debounce::Debouncer;
use wabroker_dispatcher::{InFlightSet, TenantDirectory, WorkerContext, WorkerPool};
use wabroker_router::Router as TenantRouter;
use wabroker_store::{db, Store};
use wabroker_transport::TransportRegistry;

mod app;
mod broadcast;
mod http;

/// Config error, per spec §6 CLI surface.
const EXIT_CONFIG_ERROR: i32 = 1;
/// Store unreachable at startup.
const EXIT_STORE_UNREACHABLE: i32 = 2;
/// Transport unreachable at startup for any tenant.
const EXIT_TRANSPORT_UNREACHABLE: i32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wabroker_gateway=info,tower_http=info".into()),
        )
        .init();

    if let Err(code) = run().await {
        std::process::exit(code);
    }
}

async fn run() -> Result<(), i32> {
    let config_path = std::env::args().nth(1).or_else(|| std::env::var("WABROKER_CONFIG").ok());
    let config = BrokerConfig::load(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "configuration error");
        EXIT_CONFIG_ERROR
    })?;

    let conn = Connection::open(&config.database.path).map_err(|e| {
        error!(error = %e, path = %config.database.path, "store unreachable at startup");
        EXIT_STORE_UNREACHABLE
    })?;
    db::init_db(&conn).map_err(|e| {
        error!(error = %e, "failed to initialize store schema");
        EXIT_STORE_UNREACHABLE
    })?;
    let store = Arc::new(Store::new(conn));

    let transport = Arc::new(TransportRegistry::from_config(&config).await.map_err(|e| {
        error!(error = %e, "transport unreachable for one or more tenants at startup");
        EXIT_TRANSPORT_UNREACHABLE
    })?);

    let tenant_router = Arc::new(TenantRouter::from_config(&config));
    let directory = Arc::new(TenantDirectory::from_config(&config));

    let agents = Arc::new(AgentRegistry::new());
    for tenant in &config.tenants {
        // Real agent implementations are an external collaborator (spec §1);
        // every bound `agent_id` gets a runnable `EchoAgent` so a freshly
        // deployed broker dispatches end-to-end before a real agent is
        // wired into the registry.
        agents.register(tenant.agent_id.clone(), Arc::new(EchoAgent::new(tenant.agent_id.as_str())));
    }

    let usage = Arc::new(UsageGuard::new(store.clone()));
    let tools = Arc::new(ToolExecutor::new(transport.clone(), store.clone(), usage.clone()));
    let in_flight = Arc::new(InFlightSet::new());

    let worker_ctx = WorkerContext {
        store: store.clone(),
        transport: transport.clone(),
        agents: agents.clone(),
        tools: tools.clone(),
        usage: usage.clone(),
        directory: directory.clone(),
        agent_deadline: Duration::from_secs(config.pipeline.agent_deadline_seconds),
    };
    let pool = WorkerPool::spawn(config.pipeline.max_workers, config.pipeline.queue_capacity, in_flight.clone(), worker_ctx);

    let debouncer = Arc::new(Debouncer::new(
        Duration::from_secs(config.pipeline.debounce_seconds),
        Duration::from_secs(config.pipeline.max_coalesce_span_seconds),
        Duration::from_millis(wabroker_core::config::DEBOUNCE_FLOOR_MS),
        pool.clone(),
        in_flight.clone(),
    ));

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(
        config,
        store,
        tenant_router.clone(),
        debouncer,
        pool,
        transport,
        agents,
        tools,
        usage,
        directory,
        in_flight,
    ));

    spawn_reload_listener(state.clone(), tenant_router);

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| {
            error!(error = %e, "invalid bind address");
            EXIT_CONFIG_ERROR
        })?;

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, %addr, "failed to bind gateway listener");
        EXIT_CONFIG_ERROR
    })?;
    info!(%addr, "wabroker gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "gateway server error");
            EXIT_CONFIG_ERROR
        })?;

    Ok(())
}

/// Ingress stops accepting new inbound on SIGINT/SIGTERM; in-flight workers
/// keep running (they aren't cancelled by `axum::serve` shutdown) for the
/// shutdown budget (spec §5).
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(
        shutdown_budget_secs = GRACEFUL_SHUTDOWN_BUDGET_SECS,
        "gateway shutting down, in-flight turns given the shutdown budget to finish"
    );
}

/// Reloads the sender→tenant map on SIGHUP (spec §5: "read-mostly; loaded at
/// startup, reloaded atomically on SIGHUP-equivalent signals"). Only the
/// router's bindings reload this way; transport credentials and the agent
/// registry require a restart.
#[cfg(unix)]
fn spawn_reload_listener(state: Arc<app::AppState>, tenant_router: Arc<TenantRouter>) {
    tokio::spawn(async move {
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(error = %e, "failed to install SIGHUP handler, tenant map reload disabled");
                return;
            }
        };
        loop {
            sighup.recv().await;
            let config_path = std::env::args().nth(1).or_else(|| std::env::var("WABROKER_CONFIG").ok());
            match BrokerConfig::load(config_path.as_deref()) {
                Ok(fresh) => {
                    tenant_router.reload(&fresh);
                    *state.config.write().unwrap() = fresh;
                    info!("configuration reloaded on SIGHUP");
                }
                Err(e) => warn!(error = %e, "SIGHUP reload failed, keeping previous tenant map"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_state: Arc<app::AppState>, _tenant_router: Arc<TenantRouter>) {}
