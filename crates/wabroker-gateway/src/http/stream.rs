//! `GET /stream` — long-lived SSE subscription onto the Broadcast Hub
//! (spec §4.1, §4.8). `?tenant_id=` narrows to one tenant's events.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use serde::Deserialize;
use wabroker_core::config::SSE_HEARTBEAT_SECS;
use wabroker_core::types::TenantId;

use crate::app::AppState;
use crate::broadcast;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    tenant_id: Option<i64>,
}

pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let tenant_filter = query.tenant_id.map(TenantId);
    let stream = broadcast::event_stream(&state.store, tenant_filter);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(SSE_HEARTBEAT_SECS)))
}
