use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// `GET /health` — liveness probe (spec §6): queue depth, worker busy
/// count, per-tenant transport reachability.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let pool = state.pool.health();
    let transports: Vec<Value> = state
        .config
        .read()
        .unwrap()
        .tenants
        .iter()
        .filter_map(|t| {
            state.transport.get(t.tenant_id).map(|transport| {
                json!({
                    "tenant_id": t.tenant_id.0,
                    "transport": transport.name(),
                    "reachable": matches!(
                        transport.status(),
                        wabroker_transport::TransportStatus::Connected
                    ),
                })
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "queue_depth": pool.queue_depth,
        "queue_capacity": pool.queue_capacity,
        "busy_workers": pool.busy_workers,
        "rejected_count": pool.rejected_count,
        "transports": transports,
    }))
}
