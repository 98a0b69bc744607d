use std::time::Instant;

use async_trait::async_trait;
use wabroker_core::types::{
    ChatbotId, ContactId, ConversationKey, MessageType, TenantId, ThreadId,
};

/// One message folded into a coalesced Turn, in receipt order.
#[derive(Debug, Clone)]
pub struct CoalescedMessage {
    pub provider_message_id: Option<String>,
    pub message_type: MessageType,
    pub text: Option<String>,
    pub media_url: Option<String>,
}

/// The unit scheduled through the pipeline (spec §3 `Turn`).
#[derive(Debug, Clone)]
pub struct Turn {
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub contact_id: ContactId,
    pub thread_id: ThreadId,
    pub messages: Vec<CoalescedMessage>,
    /// Newline-joined concatenation of per-message texts, in receipt order.
    pub merged_text: String,
    pub first_arrival: Instant,
    pub last_arrival: Instant,
    pub language_hint: Option<String>,
}

impl Turn {
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey {
            tenant_id: self.tenant_id,
            contact_id: self.contact_id,
        }
    }

    /// Media-bearing messages, collected separately from `merged_text`
    /// (spec §4.3: "attachments collected separately").
    pub fn attachments(&self) -> Vec<&CoalescedMessage> {
        self.messages
            .iter()
            .filter(|m| m.media_url.is_some())
            .collect()
    }
}

/// One freshly-arrived inbound message handed to the Debouncer by the Router.
#[derive(Debug, Clone)]
pub struct IncomingPiece {
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub contact_id: ContactId,
    pub thread_id: ThreadId,
    pub message: CoalescedMessage,
    pub language_hint: Option<String>,
}

/// Lets the Debouncer ask whether a conversation's previous Turn is still
/// being worked, without owning the in-flight set itself — that set belongs
/// to the dispatcher (spec §4.4). When a deadline fires for a conversation
/// still in flight, the Debouncer re-arms rather than dispatching.
pub trait InFlightGuard: Send + Sync {
    fn is_in_flight(&self, key: ConversationKey) -> bool;
}

/// Receives a flushed Turn from the Debouncer. Implemented by the dispatcher
/// (spec §4.4), which alone knows how to reject-with-broadcast when its
/// queue is at capacity — the Debouncer itself has no Store/Broadcast access.
#[async_trait]
pub trait TurnSubmitter: Send + Sync {
    async fn submit(&self, turn: Turn);
}
