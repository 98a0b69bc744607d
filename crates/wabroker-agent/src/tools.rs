use std::str::FromStr;
use std::sync::Arc;

use tracing::instrument;
use wabroker_core::config::{ACTION_REQUEST_DATA_MAX_BYTES, SEND_IMAGE_MAX_BYTES};
use wabroker_core::types::{normalize_msisdn, ActionPriority, MessageType};
use wabroker_store::types::{Action, NewAction, NewMessage};
use wabroker_store::Store;
use wabroker_transport::types::{DownloadedMedia, SendResult, TemplateButton};
use wabroker_transport::TransportRegistry;

use crate::error::{AgentError, Result};
use crate::types::TurnContext;
use crate::usage::UsageGuard;

const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const MAX_LOCATION_LABEL_LEN: usize = 1000;

pub struct SendImageArgs {
    pub to_number: String,
    pub image_url: String,
    pub caption: Option<String>,
}

pub struct SendLocationArgs {
    pub to_number: String,
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

pub struct SendTemplateArgs {
    pub to_number: String,
    pub template_name: String,
    pub variables: Vec<String>,
    pub buttons: Vec<TemplateButton>,
}

pub struct SubmitActionArgs {
    pub request_type: String,
    pub request_details: String,
    pub priority: String,
    pub request_data: Option<serde_json::Value>,
}

/// Executes the tool set an Agent may invoke mid-Turn (spec §4.6). Every
/// call is scoped to the tenant and contact of the Turn that's running — the
/// tenant is always taken from `ctx`, never from tool arguments, so a
/// misbehaving or compromised agent can't address another tenant's
/// customer or transport credentials.
pub struct ToolExecutor {
    transport: Arc<TransportRegistry>,
    store: Arc<Store>,
    usage: Arc<UsageGuard>,
    /// Plain (unauthenticated) client used only to HEAD-check `image_url`'s
    /// size before handing it to the tenant's BSP transport — the image
    /// lives on the caller's own CDN, not behind BSP credentials.
    http: reqwest::Client,
}

impl ToolExecutor {
    pub fn new(transport: Arc<TransportRegistry>, store: Arc<Store>, usage: Arc<UsageGuard>) -> Self {
        Self { transport, store, usage, http: reqwest::Client::new() }
    }

    fn transport_for(&self, ctx: &TurnContext) -> Result<Arc<dyn wabroker_transport::MessagingTransport>> {
        self.transport
            .get(ctx.tenant_id)
            .ok_or(AgentError::NoTransport(ctx.tenant_id.0))
    }

    /// `to_number` must resolve to the contact this Turn belongs to (spec
    /// §4.6: "attempts to send to an arbitrary number are rejected").
    fn check_destination(&self, ctx: &TurnContext, to_number: &str) -> Result<String> {
        let requested = normalize_msisdn(to_number);
        let owner = normalize_msisdn(&ctx.from_number);
        if requested != owner {
            return Err(AgentError::TenantMismatch);
        }
        Ok(requested)
    }

    #[instrument(skip(self, args), fields(tenant_id = ctx.tenant_id.0))]
    pub async fn send_image(&self, ctx: &TurnContext, args: SendImageArgs) -> Result<SendResult> {
        let to = self.check_destination(ctx, &args.to_number)?;
        if !args.image_url.starts_with("https://") {
            return Err(AgentError::ToolValidation("image_url must use https".into()));
        }
        let extension = args
            .image_url
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AgentError::ToolValidation(format!(
                "unsupported image format: {extension}"
            )));
        }
        if let Ok(head) = self.http.head(&args.image_url).send().await {
            if let Some(len) = head
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
            {
                if len > SEND_IMAGE_MAX_BYTES {
                    return Err(AgentError::ToolValidation(format!(
                        "image exceeds {SEND_IMAGE_MAX_BYTES} byte cap"
                    )));
                }
            }
        }

        let transport = self.transport_for(ctx)?;
        let result = transport
            .send_image(&to, &args.image_url, args.caption.as_deref())
            .await?;

        self.store
            .insert_message(NewMessage::outgoing(
                ctx.tenant_id,
                ctx.chatbot_id,
                ctx.contact_id,
                MessageType::Image,
                args.caption,
                Some(args.image_url),
            ))
            .await?;
        self.usage.record_outbound(ctx.tenant_id).await?;
        Ok(result)
    }

    #[instrument(skip(self, args), fields(tenant_id = ctx.tenant_id.0))]
    pub async fn send_location(
        &self,
        ctx: &TurnContext,
        args: SendLocationArgs,
    ) -> Result<SendResult> {
        let to = self.check_destination(ctx, &args.to_number)?;
        if !(-90.0..=90.0).contains(&args.lat) {
            return Err(AgentError::ToolValidation("lat out of range".into()));
        }
        if !(-180.0..=180.0).contains(&args.lon) {
            return Err(AgentError::ToolValidation("lon out of range".into()));
        }
        if args.name.as_deref().map(str::len).unwrap_or(0) > MAX_LOCATION_LABEL_LEN
            || args.address.as_deref().map(str::len).unwrap_or(0) > MAX_LOCATION_LABEL_LEN
        {
            return Err(AgentError::ToolValidation("name/address exceeds 1000 chars".into()));
        }

        let transport = self.transport_for(ctx)?;
        let result = transport
            .send_location(&to, args.lat, args.lon, args.name.as_deref(), args.address.as_deref())
            .await?;

        let content = format!("{},{}", args.lat, args.lon);
        self.store
            .insert_message(NewMessage::outgoing(
                ctx.tenant_id,
                ctx.chatbot_id,
                ctx.contact_id,
                MessageType::Location,
                Some(content),
                None,
            ))
            .await?;
        self.usage.record_outbound(ctx.tenant_id).await?;
        Ok(result)
    }

    #[instrument(skip(self, args), fields(tenant_id = ctx.tenant_id.0))]
    pub async fn send_template(
        &self,
        ctx: &TurnContext,
        args: SendTemplateArgs,
    ) -> Result<SendResult> {
        let to = self.check_destination(ctx, &args.to_number)?;
        let transport = self.transport_for(ctx)?;
        let result = transport
            .send_template(&to, &args.template_name, &args.variables, &args.buttons)
            .await?;

        self.store
            .insert_message(NewMessage::outgoing(
                ctx.tenant_id,
                ctx.chatbot_id,
                ctx.contact_id,
                MessageType::Template,
                Some(args.template_name),
                None,
            ))
            .await?;
        self.usage.record_outbound(ctx.tenant_id).await?;
        Ok(result)
    }

    /// Creates a pending Action and an `internal`/`action_indicator`
    /// transcript row referencing it (spec §4.6). Never touches transport.
    #[instrument(skip(self, args), fields(tenant_id = ctx.tenant_id.0))]
    pub async fn submit_action(&self, ctx: &TurnContext, args: SubmitActionArgs) -> Result<Action> {
        let priority = ActionPriority::from_str(&args.priority)
            .map_err(AgentError::ToolValidation)?;
        let request_data = args.request_data.unwrap_or(serde_json::Value::Null);
        let data_len = serde_json::to_vec(&request_data).map(|v| v.len()).unwrap_or(0);
        if data_len > ACTION_REQUEST_DATA_MAX_BYTES {
            return Err(AgentError::ToolValidation(format!(
                "request_data exceeds {ACTION_REQUEST_DATA_MAX_BYTES} bytes"
            )));
        }

        let action = self
            .store
            .create_action(NewAction {
                tenant_id: ctx.tenant_id,
                chatbot_id: ctx.chatbot_id,
                contact_id: ctx.contact_id,
                request_type: args.request_type.clone(),
                request_details: args.request_details.clone(),
                request_data,
                priority,
            })
            .await?;

        self.store
            .insert_message(NewMessage::internal(
                ctx.tenant_id,
                ctx.chatbot_id,
                ctx.contact_id,
                MessageType::ActionIndicator,
                format!("action #{} submitted: {}", action.action_id, args.request_type),
                serde_json::json!({ "action_id": action.action_id.0 }),
            ))
            .await?;
        Ok(action)
    }

    /// Fetches inbound media via transport HEAD+GET, enforcing the size cap
    /// (spec §4.6). No transcript row is written.
    #[instrument(skip(self), fields(tenant_id = ctx.tenant_id.0))]
    pub async fn download_media(
        &self,
        ctx: &TurnContext,
        provider_media_url: &str,
    ) -> Result<DownloadedMedia> {
        let transport = self.transport_for(ctx)?;
        let media = transport.download_media(provider_media_url).await?;
        if media.size_bytes > SEND_IMAGE_MAX_BYTES {
            return Err(AgentError::ToolValidation(format!(
                "media exceeds {SEND_IMAGE_MAX_BYTES} byte cap"
            )));
        }
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabroker_core::config::{BrokerConfig, TenantBinding};
    use wabroker_core::types::{AgentId, ChatbotId, ContactId, TenantId};

    async fn harness() -> (Arc<ToolExecutor>, TurnContext) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        wabroker_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));

        let mut cfg = BrokerConfig::default();
        cfg.transport.bsp_api_key = Some("key".into());
        cfg.tenants.push(TenantBinding {
            sender_msisdn: "96171234567".into(),
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            agent_id: AgentId("ecla".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });
        let transport = Arc::new(TransportRegistry::from_config_unprobed(&cfg).unwrap());
        let usage = Arc::new(UsageGuard::new(store.clone()));

        let contact = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();

        let executor = Arc::new(ToolExecutor::new(transport, store, usage));

        let ctx = TurnContext {
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            contact_id: contact.contact_id,
            from_number: "9999".into(),
            language_hint: None,
            tools: executor.clone(),
        };
        (executor, ctx)
    }

    #[tokio::test]
    async fn send_image_rejects_non_https_url() {
        let (executor, ctx) = harness().await;
        let err = executor
            .send_image(
                &ctx,
                SendImageArgs {
                    to_number: "9999".into(),
                    image_url: "http://example.com/a.png".into(),
                    caption: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn send_image_rejects_unsupported_format() {
        let (executor, ctx) = harness().await;
        let err = executor
            .send_image(
                &ctx,
                SendImageArgs {
                    to_number: "9999".into(),
                    image_url: "https://example.com/a.pdf".into(),
                    caption: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn send_image_rejects_destination_outside_turn() {
        let (executor, ctx) = harness().await;
        let err = executor
            .send_image(
                &ctx,
                SendImageArgs {
                    to_number: "111222333".into(),
                    image_url: "https://example.com/a.png".into(),
                    caption: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TenantMismatch));
    }

    #[tokio::test]
    async fn send_location_rejects_out_of_range_latitude() {
        let (executor, ctx) = harness().await;
        let err = executor
            .send_location(
                &ctx,
                SendLocationArgs {
                    to_number: "9999".into(),
                    lat: 90.0001,
                    lon: 0.0,
                    name: None,
                    address: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn send_location_rejects_oversize_label() {
        let (executor, ctx) = harness().await;
        let err = executor
            .send_location(
                &ctx,
                SendLocationArgs {
                    to_number: "9999".into(),
                    lat: 0.0,
                    lon: 0.0,
                    name: Some("x".repeat(1001)),
                    address: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn submit_action_accepts_request_data_at_exactly_10240_bytes() {
        let (executor, ctx) = harness().await;
        // `{"k":"...."}` — pad a string value so the serialized JSON is
        // exactly 10,240 bytes (spec §8 boundary behavior).
        let overhead = 8; // {"k":""}
        let padding = "a".repeat(10240 - overhead);
        let data = serde_json::json!({ "k": padding });
        assert_eq!(serde_json::to_vec(&data).unwrap().len(), 10240);

        let action = executor
            .submit_action(
                &ctx,
                SubmitActionArgs {
                    request_type: "refund_request".into(),
                    request_details: "details".into(),
                    priority: "high".into(),
                    request_data: Some(data),
                },
            )
            .await
            .unwrap();
        assert_eq!(action.status, wabroker_core::types::ActionStatus::Pending);
    }

    #[tokio::test]
    async fn submit_action_rejects_request_data_over_10240_bytes() {
        let (executor, ctx) = harness().await;
        let padding = "a".repeat(10241 - 8 + 1);
        let data = serde_json::json!({ "k": padding });
        let err = executor
            .submit_action(
                &ctx,
                SubmitActionArgs {
                    request_type: "refund_request".into(),
                    request_details: "details".into(),
                    priority: "high".into(),
                    request_data: Some(data),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn submit_action_rejects_unknown_priority() {
        let (executor, ctx) = harness().await;
        let err = executor
            .submit_action(
                &ctx,
                SubmitActionArgs {
                    request_type: "refund_request".into(),
                    request_details: "details".into(),
                    priority: "urgent".into(),
                    request_data: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }
}
