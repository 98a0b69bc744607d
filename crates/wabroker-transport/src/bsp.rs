use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::MessagingTransport;
use crate::types::{DownloadedMedia, SendResult, TemplateButton, TransportStatus};

/// ±jitter fraction applied to each backoff delay, same idiom as the
/// teacher's channel reconnect backoff — a deterministic pseudo-random value
/// derived from the clock rather than pulling in a `rand` dependency.
const JITTER_FRACTION: f64 = 0.20;
const BACKOFF_CAP_MS: u64 = 8_000;

/// One tenant's BSP HTTP client. Each tenant gets its own instance because
/// sender credentials differ per tenant (spec §5) — bound at construction to
/// that tenant's `sender_msisdn` ("from"), API key, and base URL.
pub struct BspTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_msisdn: String,
    max_retries: u32,
    status: Mutex<TransportStatus>,
}

impl BspTransport {
    pub fn new(
        from_msisdn: String,
        api_key: String,
        base_url: String,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            from_msisdn,
            max_retries,
            status: Mutex::new(TransportStatus::Connecting),
        })
    }

    fn set_status(&self, status: TransportStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// POSTs `body` to `path`, retrying transient failures with exponential
    /// backoff (500ms doubling, jittered, capped at 8s) up to `max_retries`
    /// (spec §7). A `429` honors `Retry-After` when present and does not
    /// count toward the retry budget for its first two occurrences.
    async fn post_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        let mut rate_limit_grace = 2u32;
        let mut delay_ms = 500u64;

        loop {
            let result = self
                .client
                .post(&url)
                .header("Authorization", format!("App {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 429 {
                        let retry_after_ms = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(|secs| secs * 1000)
                            .unwrap_or(delay_ms);
                        if rate_limit_grace > 0 {
                            rate_limit_grace -= 1;
                        } else {
                            attempt += 1;
                            if attempt > self.max_retries {
                                self.set_status(TransportStatus::Error("rate limited".to_string()));
                                return Err(TransportError::RateLimited { retry_after_ms });
                            }
                        }
                        warn!(url = %url, retry_after_ms, "BSP rate limited, backing off");
                        tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                        delay_ms = (delay_ms * 2).min(BACKOFF_CAP_MS);
                        continue;
                    }

                    if !resp.status().is_success() {
                        let message = resp.text().await.unwrap_or_default();
                        attempt += 1;
                        if attempt > self.max_retries {
                            self.set_status(TransportStatus::Error(format!("BSP returned {status}")));
                            return Err(TransportError::Api { status, message });
                        }
                        warn!(url = %url, status, attempt, "BSP send failed, retrying");
                        let wait = delay_ms + jitter_ms(delay_ms);
                        tokio::time::sleep(Duration::from_millis(wait)).await;
                        delay_ms = (delay_ms * 2).min(BACKOFF_CAP_MS);
                        continue;
                    }

                    self.set_status(TransportStatus::Connected);
                    return resp.json::<serde_json::Value>().await.map_err(TransportError::Http);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        self.set_status(TransportStatus::Error(e.to_string()));
                        return Err(TransportError::Http(e));
                    }
                    warn!(url = %url, attempt, error = %e, "BSP request failed, retrying");
                    let wait = delay_ms + jitter_ms(delay_ms);
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    delay_ms = (delay_ms * 2).min(BACKOFF_CAP_MS);
                }
            }
        }
    }

    fn extract_message_id(resp: &serde_json::Value) -> Option<String> {
        resp.get("id")
            .or_else(|| resp.get("messageId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[async_trait]
impl MessagingTransport for BspTransport {
    fn name(&self) -> &str {
        &self.from_msisdn
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendResult, TransportError> {
        debug!(to, "sending text via BSP");
        let body = serde_json::json!({
            "from": self.from_msisdn,
            "to": to,
            "content": { "text": text },
        });
        let resp = self.post_with_retry("/whatsapp/1/message/text", body).await?;
        Ok(SendResult { provider_message_id: Self::extract_message_id(&resp) })
    }

    async fn send_image(
        &self,
        to: &str,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<SendResult, TransportError> {
        debug!(to, image_url, "sending image via BSP");
        let mut content = serde_json::json!({ "mediaUrl": image_url });
        if let Some(caption) = caption {
            content["caption"] = serde_json::json!(caption);
        }
        let body = serde_json::json!({
            "from": self.from_msisdn,
            "to": to,
            "content": content,
        });
        let resp = self.post_with_retry("/whatsapp/1/message/image", body).await?;
        Ok(SendResult { provider_message_id: Self::extract_message_id(&resp) })
    }

    async fn send_location(
        &self,
        to: &str,
        lat: f64,
        lon: f64,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<SendResult, TransportError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(TransportError::Validation(format!(
                "coordinates out of range: lat={lat}, lon={lon}"
            )));
        }
        let mut content = serde_json::json!({ "latitude": lat, "longitude": lon });
        if let Some(name) = name {
            content["name"] = serde_json::json!(name);
        }
        if let Some(address) = address {
            content["address"] = serde_json::json!(address);
        }
        let body = serde_json::json!({
            "from": self.from_msisdn,
            "to": to,
            "content": content,
        });
        let resp = self.post_with_retry("/whatsapp/1/message/location", body).await?;
        Ok(SendResult { provider_message_id: Self::extract_message_id(&resp) })
    }

    async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        variables: &[String],
        buttons: &[TemplateButton],
    ) -> Result<SendResult, TransportError> {
        let body = serde_json::json!({
            "from": self.from_msisdn,
            "to": to,
            "content": {
                "templateName": template_name,
                "templateData": variables,
                "language": "en",
                "buttons": buttons,
            },
        });
        let resp = self.post_with_retry("/whatsapp/1/message/template", body).await?;
        Ok(SendResult { provider_message_id: Self::extract_message_id(&resp) })
    }

    async fn download_media(
        &self,
        provider_media_url: &str,
    ) -> Result<DownloadedMedia, TransportError> {
        let head = self
            .client
            .head(provider_media_url)
            .header("Authorization", format!("App {}", self.api_key))
            .send()
            .await?;
        let content_type = head
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let resp = self
            .client
            .get(provider_media_url)
            .header("Authorization", format!("App {}", self.api_key))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Api {
                status: resp.status().as_u16(),
                message: "media download failed".to_string(),
            });
        }
        let bytes = resp.bytes().await?.to_vec();
        let size_bytes = bytes.len() as u64;
        Ok(DownloadedMedia { bytes, content_type, size_bytes })
    }

    fn status(&self) -> TransportStatus {
        self.status.lock().unwrap().clone()
    }

    /// A bare `GET` against the tenant's BSP base URL. Any HTTP response —
    /// even a 404 from an endpoint that doesn't serve `GET` on its root —
    /// proves the network path and TLS handshake succeed; only a transport-
    /// level failure (DNS, connect refused, timeout) counts as unreachable.
    async fn probe(&self) -> Result<(), TransportError> {
        match self.client.get(&self.base_url).send().await {
            Ok(_) => {
                self.set_status(TransportStatus::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_status(TransportStatus::Error(e.to_string()));
                Err(TransportError::Http(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_fraction() {
        let base = 1000;
        let j = jitter_ms(base);
        assert!(j <= (base as f64 * JITTER_FRACTION) as u64);
    }
}
