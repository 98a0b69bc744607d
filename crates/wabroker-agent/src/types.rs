use std::sync::Arc;

use wabroker_core::types::{ChatbotId, ContactId, TenantId};

use crate::tools::ToolExecutor;

/// Per-turn context handed to the Agent alongside the merged input (spec
/// §4.4 step 5). The agent never sees raw tenant credentials — only enough
/// identity to scope its own memory key and address the customer, plus the
/// typed tool-execution callbacks (§4.5) bound to this Turn's tenant and
/// contact so a concrete Agent implementation can invoke `send_image`,
/// `send_location`, `send_template`, `submit_action`, and `download_media`
/// directly while producing its event stream.
#[derive(Clone)]
pub struct TurnContext {
    pub tenant_id: TenantId,
    pub chatbot_id: ChatbotId,
    pub contact_id: ContactId,
    pub from_number: String,
    pub language_hint: Option<String>,
    pub tools: Arc<ToolExecutor>,
}

impl std::fmt::Debug for TurnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnContext")
            .field("tenant_id", &self.tenant_id)
            .field("chatbot_id", &self.chatbot_id)
            .field("contact_id", &self.contact_id)
            .field("from_number", &self.from_number)
            .field("language_hint", &self.language_hint)
            .finish_non_exhaustive()
    }
}

/// One event in the stream an `Agent::run` call produces (spec §4.5).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Incremental text content. Never sent to the customer directly — only
    /// `Final` text is transmitted (spec §4.4 step 6).
    TextChunk { text: String },
    /// The agent wants to invoke a tool. The worker executes it and feeds
    /// the result back via `ToolResult` before the agent continues.
    ToolCall {
        correlation_id: String,
        name: String,
        arguments_json: serde_json::Value,
    },
    /// Echoed back to the agent by the worker after it executes a tool call.
    ToolResult {
        correlation_id: String,
        result_json: serde_json::Value,
    },
    /// The agent's final customer-visible reply for this Turn.
    Final { text: String },
    /// The agent failed to make progress on this Turn.
    Error { kind: String, detail: String },
}
