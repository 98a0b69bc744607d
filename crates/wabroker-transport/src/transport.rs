use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{DownloadedMedia, SendResult, TemplateButton, TransportStatus};

/// Narrow seam between the broker and a BSP's HTTP API. Implementations own
/// one tenant's credentials and connection pool.
///
/// Implementations must be `Send + Sync`: workers across the dispatcher pool
/// call the same tenant's transport concurrently.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Stable identifier for this transport instance, usually the tenant's
    /// sender MSISDN.
    fn name(&self) -> &str;

    async fn send_text(&self, to: &str, text: &str) -> Result<SendResult, TransportError>;

    /// `image_url` must already satisfy the size/HTTPS/format caps enforced
    /// by the tool execution layer before this is called.
    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<SendResult, TransportError>;

    async fn send_location(
        &self,
        to: &str,
        lat: f64,
        lon: f64,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<SendResult, TransportError>;

    async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        variables: &[String],
        buttons: &[TemplateButton],
    ) -> Result<SendResult, TransportError>;

    /// `HEAD`+`GET` the inbound media URL referenced by a received message.
    async fn download_media(
        &self,
        provider_media_url: &str,
    ) -> Result<DownloadedMedia, TransportError>;

    /// Last observed connection state, updated by `probe` and by outbound
    /// send outcomes. Never blocks on the network itself.
    fn status(&self) -> TransportStatus;

    /// Actively checks whether the BSP endpoint is reachable, updating the
    /// value `status()` reports. Called once per tenant at startup (spec §6
    /// "transport unreachable at startup for any tenant").
    async fn probe(&self) -> Result<(), TransportError>;
}
