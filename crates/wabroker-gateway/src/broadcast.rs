//! Broadcast Hub (spec §4.8) — turns `StoreEvent`s into SSE frames for
//! `GET /stream` subscribers.
//!
//! Each subscriber gets its own `tokio::sync::broadcast::Receiver` off the
//! Store's event channel; a subscriber that falls behind more than the
//! channel's capacity observes `Lagged` and simply misses the skipped
//! events rather than blocking the publisher (spec §9: "bounded 64-event
//! per-subscriber buffers ... surplus events are dropped, never
//! back-pressured onto the publisher").

use axum::response::sse::Event;
use futures_util::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;
use wabroker_core::types::TenantId;
use wabroker_store::types::StoreEvent;
use wabroker_store::Store;

/// Builds the per-connection SSE stream for `GET /stream`. `tenant_filter`
/// narrows a subscription to one tenant's events (the topic-specific
/// variants spec §4.1 alludes to); `None` subscribes to everything.
pub fn event_stream(
    store: &Store,
    tenant_filter: Option<TenantId>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    BroadcastStream::new(store.subscribe()).filter_map(move |item| match item {
        Ok(event) => {
            if tenant_filter.is_some_and(|t| t != event.tenant_id()) {
                return None;
            }
            to_sse(&event)
        }
        Err(_lagged) => {
            warn!("SSE subscriber lagged, surplus events dropped");
            None
        }
    })
}

fn to_sse(event: &StoreEvent) -> Option<Result<Event, std::convert::Infallible>> {
    let data = serde_json::to_string(event).ok()?;
    Some(Ok(Event::default().event(event_name(event)).data(data)))
}

fn event_name(event: &StoreEvent) -> &'static str {
    match event {
        StoreEvent::MessageIncoming { .. } => "message_incoming",
        StoreEvent::MessageOutgoing { .. } => "message_outgoing",
        StoreEvent::MessageManual { .. } => "message_manual",
        StoreEvent::MessageStatusChanged { .. } => "message_status_changed",
        StoreEvent::ActionCreated { .. } => "action_created",
        StoreEvent::ActionResolved { .. } => "action_resolved",
        StoreEvent::ContactPaused { .. } => "contact_paused",
        StoreEvent::ContactResumed { .. } => "contact_resumed",
        StoreEvent::QuotaExceeded { .. } => "quota_exceeded",
        StoreEvent::QueueFull { .. } => "queue_full",
        StoreEvent::TurnSkippedPaused { .. } => "turn_skipped_paused",
    }
}
