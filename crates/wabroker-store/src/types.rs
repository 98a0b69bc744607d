use serde::{Deserialize, Serialize};
use wabroker_core::types::{
    ActionId, ActionPriority, ActionStatus, ChatbotId, ContactId, MessageDirection, MessageId,
    MessageStatus, MessageType, TenantId,
};

/// A conversational counterparty within a tenant (spec §3 `Contact`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: ContactId,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub thread_id: String,
    pub paused: bool,
    pub paused_at: Option<String>,
    pub paused_by: Option<String>,
    pub last_interaction: Option<String>,
    pub custom_fields: serde_json::Value,
}

/// One logical message on the transcript (spec §3 `Message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub provider_message_id: Option<String>,
    pub contact_id: ContactId,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub direction: MessageDirection,
    pub message_type: MessageType,
    pub content_text: Option<String>,
    pub content_url: Option<String>,
    pub status: MessageStatus,
    pub sent_at: String,
    pub metadata: serde_json::Value,
    pub user_sent: bool,
    pub ai_processed: bool,
    pub processing_duration_ms: Option<i64>,
}

/// Fields needed to insert a new message row. `message_id` is assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub provider_message_id: Option<String>,
    pub contact_id: ContactId,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub direction: MessageDirection,
    pub message_type: MessageType,
    pub content_text: Option<String>,
    pub content_url: Option<String>,
    pub status: MessageStatus,
    pub metadata: serde_json::Value,
    pub user_sent: bool,
    pub ai_processed: bool,
}

impl NewMessage {
    pub fn incoming(
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        contact_id: ContactId,
        provider_message_id: Option<String>,
        message_type: MessageType,
        content_text: Option<String>,
        content_url: Option<String>,
    ) -> Self {
        Self {
            provider_message_id,
            contact_id,
            tenant_id,
            chatbot_id,
            direction: MessageDirection::Incoming,
            message_type,
            content_text,
            content_url,
            status: MessageStatus::Delivered,
            metadata: serde_json::Value::Null,
            user_sent: true,
            ai_processed: false,
        }
    }

    pub fn outgoing(
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        contact_id: ContactId,
        message_type: MessageType,
        content_text: Option<String>,
        content_url: Option<String>,
    ) -> Self {
        Self {
            provider_message_id: None,
            contact_id,
            tenant_id,
            chatbot_id,
            direction: MessageDirection::Outgoing,
            message_type,
            content_text,
            content_url,
            status: MessageStatus::Pending,
            metadata: serde_json::Value::Null,
            user_sent: false,
            ai_processed: true,
        }
    }

    pub fn manual(
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        contact_id: ContactId,
        content_text: String,
    ) -> Self {
        Self {
            provider_message_id: None,
            contact_id,
            tenant_id,
            chatbot_id,
            direction: MessageDirection::Manual,
            message_type: MessageType::Text,
            content_text: Some(content_text),
            content_url: None,
            status: MessageStatus::Pending,
            metadata: serde_json::Value::Null,
            user_sent: true,
            ai_processed: false,
        }
    }

    pub fn internal(
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        contact_id: ContactId,
        message_type: MessageType,
        content_text: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            provider_message_id: None,
            contact_id,
            tenant_id,
            chatbot_id,
            direction: MessageDirection::Internal,
            message_type,
            content_text: Some(content_text),
            content_url: None,
            status: MessageStatus::Sent,
            metadata,
            user_sent: false,
            ai_processed: true,
        }
    }
}

/// A human-in-the-loop request raised by an agent tool (spec §3 `Action`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: ActionId,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub contact_id: ContactId,
    pub request_type: String,
    pub request_details: String,
    pub request_data: serde_json::Value,
    pub priority: ActionPriority,
    pub status: ActionStatus,
    pub user_response: Option<String>,
    pub response_data: Option<serde_json::Value>,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAction {
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub contact_id: ContactId,
    pub request_type: String,
    pub request_details: String,
    pub request_data: serde_json::Value,
    pub priority: ActionPriority,
}

/// Per-tenant, per-calendar-day outbound counters (spec §3 `UsageCounter`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageCounter {
    pub tenant_id: TenantId,
    pub date: chrono::NaiveDate,
    pub outbound_count: u64,
    pub campaign_count: u64,
}

/// Per-chatbot Q/A pair populated from external catalog events (spec §3
/// `KnowledgeEntry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub category: String,
    pub question: String,
    pub answer: String,
    pub is_active: bool,
}

/// Change-notification events published by the store. The Broadcast Hub
/// subscribes and turns these into SSE frames (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    MessageIncoming { tenant_id: TenantId, message_id: MessageId, contact_id: ContactId },
    MessageOutgoing { tenant_id: TenantId, message_id: MessageId, contact_id: ContactId },
    MessageManual { tenant_id: TenantId, message_id: MessageId, contact_id: ContactId },
    MessageStatusChanged { tenant_id: TenantId, message_id: MessageId, status: MessageStatus },
    ActionCreated { tenant_id: TenantId, action_id: ActionId },
    ActionResolved { tenant_id: TenantId, action_id: ActionId, status: ActionStatus },
    ContactPaused { tenant_id: TenantId, contact_id: ContactId },
    ContactResumed { tenant_id: TenantId, contact_id: ContactId },
    QuotaExceeded { tenant_id: TenantId },
    QueueFull { tenant_id: TenantId },
    TurnSkippedPaused { tenant_id: TenantId, contact_id: ContactId },
}

impl StoreEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            StoreEvent::MessageIncoming { tenant_id, .. }
            | StoreEvent::MessageOutgoing { tenant_id, .. }
            | StoreEvent::MessageManual { tenant_id, .. }
            | StoreEvent::MessageStatusChanged { tenant_id, .. }
            | StoreEvent::ActionCreated { tenant_id, .. }
            | StoreEvent::ActionResolved { tenant_id, .. }
            | StoreEvent::ContactPaused { tenant_id, .. }
            | StoreEvent::ContactResumed { tenant_id, .. }
            | StoreEvent::QuotaExceeded { tenant_id }
            | StoreEvent::QueueFull { tenant_id }
            | StoreEvent::TurnSkippedPaused { tenant_id, .. } => *tenant_id,
        }
    }
}
