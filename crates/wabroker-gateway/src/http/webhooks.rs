//! The four HTTP endpoints a deployment's BSP, operator tooling, and
//! provider-catalog source call into (spec §4.1).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{body::Bytes, Json};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};
use wabroker_core::types::{
    normalize_msisdn, ActionId, ActionStatus, ChatbotId, ContactId, MessageId, MessageStatus,
    MessageType, TenantId, ThreadId,
};
use wabroker_debounce::{CoalescedMessage, IncomingPiece};
use wabroker_store::types::NewMessage;

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

// ── POST /webhook — BSP inbound envelope ────────────────────────────────

#[derive(Debug, Deserialize)]
struct BspWebhookEnvelope {
    results: Vec<BspResultRecord>,
}

#[derive(Debug, Deserialize)]
struct BspResultRecord {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    #[serde(default, rename = "contactName")]
    contact_name: Option<String>,
    #[serde(default)]
    message: Option<BspMessagePayload>,
    #[serde(default)]
    status: Option<BspStatusPayload>,
}

#[derive(Debug, Deserialize)]
struct BspMessagePayload {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BspStatusPayload {
    name: String,
}

/// Inbound BSP envelope: a batch of either newly-received messages or
/// delivery-status callbacks, interleaved in one POST. Each record is
/// validated and applied independently — one malformed record is logged
/// and skipped rather than failing the whole batch (spec §8); only a body
/// that doesn't parse as the envelope at all is a `400`.
pub async fn bsp_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let envelope: BspWebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "malformed BSP webhook body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid webhook body"})))
    })?;

    let mut accepted = 0usize;
    for record in envelope.results {
        if let Some(status) = record.status {
            apply_status_callback(&state, record.message_id, status).await;
            accepted += 1;
            continue;
        }
        let Some(message) = record.message else {
            warn!("webhook record has neither message nor status, skipping");
            continue;
        };
        match apply_inbound_record(&state, record.from, record.to, record.message_id, record.contact_name, message)
            .await
        {
            Ok(()) => accepted += 1,
            Err(reason) => warn!(reason, "skipping unprocessable inbound record"),
        }
    }

    Ok(Json(json!({"status": "success", "processed_messages": accepted})))
}

async fn apply_status_callback(state: &AppState, message_id: Option<String>, status: BspStatusPayload) {
    let Some(provider_message_id) = message_id else {
        warn!("status callback missing messageId, skipping");
        return;
    };
    let Some(mapped) = parse_delivery_status(&status.name) else {
        warn!(status = %status.name, "unrecognized delivery status, skipping");
        return;
    };
    if let Err(err) = state.store.update_status_by_provider_id(provider_message_id, mapped).await {
        warn!(%err, "failed to apply delivery-status callback");
    }
}

async fn apply_inbound_record(
    state: &AppState,
    from: Option<String>,
    to: Option<String>,
    provider_message_id: Option<String>,
    contact_name: Option<String>,
    payload: BspMessagePayload,
) -> Result<(), &'static str> {
    let from = from.ok_or("missing from")?;
    let to = to.ok_or("missing to")?;
    let message_type = parse_message_type(&payload.kind).ok_or("unsupported message type")?;

    let target = state
        .tenant_router
        .resolve(&to)
        .map_err(|_| "unroutable destination")?;

    let phone_number = normalize_msisdn(&from);
    let contact = state
        .store
        .get_or_create_contact(target.tenant_id, target.chatbot_id, phone_number, contact_name)
        .await
        .map_err(|_| "store error creating contact")?;

    let thread_id = ThreadId::for_contact(target.tenant_id, contact.contact_id);
    let piece = IncomingPiece {
        tenant_id: target.tenant_id,
        chatbot_id: target.chatbot_id,
        contact_id: contact.contact_id,
        thread_id,
        message: CoalescedMessage {
            provider_message_id,
            message_type,
            text: payload.text,
            media_url: payload.url,
        },
        language_hint: None,
    };
    state.debouncer.on_message(piece);
    Ok(())
}

fn parse_message_type(kind: &str) -> Option<MessageType> {
    match kind.to_ascii_lowercase().as_str() {
        "text" => Some(MessageType::Text),
        "image" => Some(MessageType::Image),
        "audio" => Some(MessageType::Audio),
        "document" => Some(MessageType::Document),
        "location" => Some(MessageType::Location),
        _ => None,
    }
}

fn parse_delivery_status(name: &str) -> Option<MessageStatus> {
    match name.to_ascii_uppercase().as_str() {
        "SENT" => Some(MessageStatus::Sent),
        "DELIVERED" => Some(MessageStatus::Delivered),
        "READ" => Some(MessageStatus::Read),
        "REJECTED" | "FAILED" | "UNDELIVERABLE" => Some(MessageStatus::Failed),
        _ => None,
    }
}

// ── POST /manual-message ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ManualMessageRequest {
    pub persisted_message_id: i64,
    pub contact_id: i64,
    pub content_text: String,
    pub tenant_id: i64,
}

/// Dispatches an already-persisted manual (operator-composed) Message row
/// over the tenant's transport. Idempotent on repeated delivery of the same
/// `persisted_message_id`: once the row has left `Pending`, a repeat call
/// is a no-op that returns `200` without sending twice (spec §4.1, §8).
pub async fn manual_message_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ManualMessageRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let message_id = MessageId(req.persisted_message_id);
    let message = state
        .store
        .get_message(message_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (StatusCode::NOT_FOUND, Json(json!({"status": "error", "message": "unknown persisted_message_id"})))
        })?;

    if message.tenant_id != TenantId(req.tenant_id) || message.contact_id != ContactId(req.contact_id) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"status": "error", "message": "persisted_message_id does not match tenant_id/contact_id"})),
        ));
    }

    if message.status != MessageStatus::Pending {
        info!(message_id = req.persisted_message_id, "manual message already processed, skipping resend");
        return Ok(Json(json!({"status": "success", "message": "message already processed"})));
    }

    let contact = state
        .store
        .get_contact(message.contact_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"status": "error", "message": "contact not found"}))))?;

    let transport = state.transport.get(message.tenant_id).ok_or_else(|| {
        (StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "message": "no transport configured for tenant"})))
    })?;

    match transport.send_text(&contact.phone_number, &req.content_text).await {
        Ok(_) => {
            state
                .store
                .update_message_status(message_id, MessageStatus::Sent)
                .await
                .map_err(internal_error)?;
            state.usage.record_outbound(message.tenant_id).await.map_err(internal_error)?;
            Ok(Json(json!({"status": "success", "message": "message sent"})))
        }
        Err(err) => {
            warn!(%err, "manual message send failed");
            state
                .store
                .update_message_status(message_id, MessageStatus::Failed)
                .await
                .map_err(internal_error)?;
            Err((StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "message": "transport send failed"}))))
        }
    }
}

// ── POST /action-feedback ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActionFeedbackRequest {
    pub action_id: i64,
    pub status: String,
    pub operator_response: Option<String>,
}

/// Resolves a pending Action and relays the outcome to the customer as a
/// templated reply, plus an internal `action_indicator` row reflecting the
/// terminal status (spec §4.1, §4.6). `Store::resolve_action` is already
/// idempotent by `(action_id, status)`, so a repeat call never re-sends.
pub async fn action_feedback_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionFeedbackRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let status = parse_action_status(&req.status)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, Json(json!({"error": "unknown status"}))))?;

    let existing = state
        .store
        .get_action(ActionId(req.action_id))
        .await
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"error": "unknown action_id"}))))?;

    let resolved = state
        .store
        .resolve_action(ActionId(req.action_id), status, req.operator_response.clone(), None)
        .await
        .map_err(internal_error)?;

    let Some((action, newly_resolved)) = resolved else {
        return Err((StatusCode::NOT_FOUND, Json(json!({"error": "unknown action_id"}))));
    };
    if !newly_resolved {
        return Ok(Json(json!({"status": "ok"})));
    }

    let contact = state
        .store
        .get_contact(action.contact_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, Json(json!({"error": "contact not found"}))))?;

    let reply_text = templated_action_reply(&existing.request_type, status, req.operator_response.as_deref());

    if let Some(transport) = state.transport.get(action.tenant_id) {
        let mut outgoing = NewMessage::outgoing(
            action.tenant_id,
            action.chatbot_id,
            action.contact_id,
            MessageType::Text,
            Some(reply_text.clone()),
            None,
        );
        match transport.send_text(&contact.phone_number, &reply_text).await {
            Ok(_) => {
                outgoing.status = MessageStatus::Sent;
                state.usage.record_outbound(action.tenant_id).await.map_err(internal_error)?;
            }
            Err(err) => {
                warn!(%err, "action-feedback reply send failed");
                outgoing.status = MessageStatus::Failed;
            }
        }
        state.store.insert_message(outgoing).await.map_err(internal_error)?;
    } else {
        warn!(tenant_id = action.tenant_id.0, "no transport configured for action-feedback reply");
    }

    state
        .store
        .insert_message(NewMessage::internal(
            action.tenant_id,
            action.chatbot_id,
            action.contact_id,
            MessageType::ActionIndicator,
            format!("action #{} resolved: {}", action.action_id, status),
            json!({ "action_id": action.action_id.0, "status": status.to_string() }),
        ))
        .await
        .map_err(internal_error)?;

    Ok(Json(json!({"status": "ok"})))
}

fn parse_action_status(s: &str) -> Option<ActionStatus> {
    match s.to_ascii_lowercase().as_str() {
        "approved" => Some(ActionStatus::Approved),
        "denied" => Some(ActionStatus::Denied),
        "cancelled" | "canceled" => Some(ActionStatus::Cancelled),
        _ => None,
    }
}

fn templated_action_reply(request_type: &str, status: ActionStatus, operator_response: Option<&str>) -> String {
    let verb = match status {
        ActionStatus::Approved => "approved",
        ActionStatus::Denied => "declined",
        ActionStatus::Cancelled => "cancelled",
        ActionStatus::Pending => "updated",
    };
    match operator_response {
        Some(note) if !note.is_empty() => {
            format!("Your {request_type} request has been {verb}. {note}")
        }
        _ => format!("Your {request_type} request has been {verb}."),
    }
}

// ── POST /webhook/shopify ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ShopifyKnowledgePayload {
    tenant_id: i64,
    chatbot_id: i64,
    category: String,
    question: String,
    answer: String,
}

/// Verifies the shared-secret HMAC and upserts a catalog entry into the
/// knowledge base (spec §4.1 provider-catalog webhook). Signature failure
/// is a `401`; the rest of the webhook surface never authenticates this way
/// because BSP and operator traffic originate from trusted internal callers.
pub async fn shopify_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let secret = state.config.read().unwrap().webhooks.shopify_webhook_secret.clone();
    verify_hmac_sha256(&headers, &body, secret.as_deref()).map_err(|reason| {
        warn!(reason, "shopify webhook authentication failed");
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "authentication failed"})))
    })?;

    let payload: ShopifyKnowledgePayload = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid shopify webhook body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON body"})))
    })?;

    let entry = state
        .store
        .upsert_knowledge(
            TenantId(payload.tenant_id),
            ChatbotId(payload.chatbot_id),
            payload.category,
            payload.question,
            payload.answer,
        )
        .await
        .map_err(internal_error)?;

    info!(entry_id = entry.id, "knowledge entry upserted from shopify webhook");
    Ok(Json(json!({"ok": true, "entry_id": entry.id})))
}

/// Base64 HMAC-SHA256 of the raw body carried in `X-Shopify-Hmac-Sha256`
/// (spec §6), verified with a constant-time compare via `MacError`.
fn verify_hmac_sha256(headers: &HeaderMap, body: &Bytes, secret: Option<&str>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no HMAC secret configured".to_string())?;

    let sig_header = headers
        .get("x-shopify-hmac-sha256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Shopify-Hmac-Sha256 header".to_string())?;

    let expected = base64_decode(sig_header)
        .ok_or_else(|| "X-Shopify-Hmac-Sha256 is not valid base64".to_string())?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected).map_err(|_| "HMAC signature mismatch".to_string())
}

/// Minimal base64 decoder (standard alphabet, with padding) — the one
/// encoding this handler needs and the only one pulled in rather than
/// adding a whole `base64` crate dependency for a single header.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn val(b: u8) -> Option<u8> {
        match b {
            b'A'..=b'Z' => Some(b - b'A'),
            b'a'..=b'z' => Some(b - b'a' + 26),
            b'0'..=b'9' => Some(b - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let trimmed = input.trim_end_matches('=');
    let bytes = trimmed.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4 + 3);
    for chunk in bytes.chunks(4) {
        let mut buf = [0u8; 4];
        for (i, &b) in chunk.iter().enumerate() {
            buf[i] = val(b)?;
        }
        out.push((buf[0] << 2) | (buf[1] >> 4));
        if chunk.len() > 2 {
            out.push((buf[1] << 4) | (buf[2] >> 2));
        }
        if chunk.len() > 3 {
            out.push((buf[2] << 6) | buf[3]);
        }
    }
    Some(out)
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()})))
}
