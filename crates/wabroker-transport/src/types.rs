use serde::{Deserialize, Serialize};

/// Result of a successful outbound send — the provider's message id, if any,
/// for later reconciliation of delivery-status callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub provider_message_id: Option<String>,
}

/// A quick-reply button attached to a template send. Payload is a free-form
/// string the agent interprets on the next turn.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemplateButton {
    pub text: String,
    pub payload: Option<String>,
}

/// Binary media downloaded via `download_media`, returned to the agent
/// without a transcript row.
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Runtime connection state of a transport client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
