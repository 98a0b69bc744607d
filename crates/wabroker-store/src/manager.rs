use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{instrument, warn};
use wabroker_core::types::{
    ActionId, ActionPriority, ActionStatus, ChatbotId, ContactId, MessageDirection, MessageId,
    MessageStatus, TenantId,
};

use crate::error::StoreError;
use crate::types::*;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Relational store for contacts, messages, actions, usage counters, and
/// knowledge entries, plus a change-notification channel the Broadcast Hub
/// subscribes to (spec §4.8).
///
/// Follows the teacher's discipline for mixing a synchronous `rusqlite`
/// connection with an async call surface: the connection lives behind a
/// `tokio::sync::Mutex` and every query runs inside `spawn_blocking` so a
/// slow query never stalls the async reactor (§9 "one scheduling model
/// end-to-end").
pub struct Store {
    conn: Arc<AsyncMutex<Connection>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            conn: Arc::new(AsyncMutex::new(conn)),
            events: tx,
        }
    }

    /// Subscribe to change notifications — the Broadcast Hub's only input.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // Non-blocking: if there are no subscribers yet this is a no-op.
        let _ = self.events.send(event);
    }

    /// Broadcasts an event with no row mutation behind it — quota/backpressure
    /// signals and paused-skip notices the dispatcher raises directly rather
    /// than discovering from a write this `Store` made.
    pub fn publish_event(&self, event: StoreEvent) {
        self.publish(event);
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }

    /// Create-if-missing under the routed tenant (worker algorithm step 1,
    /// §4.4). Races are resolved with `INSERT OR IGNORE` + read-back, the
    /// same idiom the teacher's `SessionManager::get_or_create` uses.
    #[instrument(skip(self, display_name))]
    pub async fn get_or_create_contact(
        &self,
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        phone_number: String,
        display_name: Option<String>,
    ) -> Result<Contact, StoreError> {
        self.with_conn(move |db| {
            let now = chrono::Utc::now().to_rfc3339();
            let thread_id = format!("tenant:{}:phone:{}", tenant_id.0, phone_number);
            db.execute(
                "INSERT OR IGNORE INTO contacts
                 (tenant_id, chatbot_id, phone_number, display_name, thread_id,
                  paused, last_interaction, custom_fields)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, '{}')",
                params![tenant_id.0, chatbot_id.0, phone_number, display_name, thread_id, now],
            )?;
            db.query_row(
                "SELECT contact_id, tenant_id, chatbot_id, phone_number, display_name,
                        thread_id, paused, paused_at, paused_by, last_interaction, custom_fields
                 FROM contacts WHERE tenant_id = ?1 AND phone_number = ?2",
                params![tenant_id.0, phone_number],
                row_to_contact,
            )
            .map_err(StoreError::Database)
        })
        .await
    }

    pub async fn get_contact(&self, contact_id: ContactId) -> Result<Option<Contact>, StoreError> {
        self.with_conn(move |db| {
            db.query_row(
                "SELECT contact_id, tenant_id, chatbot_id, phone_number, display_name,
                        thread_id, paused, paused_at, paused_by, last_interaction, custom_fields
                 FROM contacts WHERE contact_id = ?1",
                params![contact_id.0],
                row_to_contact,
            )
            .optional()
            .map_err(StoreError::Database)
        })
        .await
    }

    pub async fn touch_last_interaction(&self, contact_id: ContactId) -> Result<(), StoreError> {
        self.with_conn(move |db| {
            let now = chrono::Utc::now().to_rfc3339();
            db.execute(
                "UPDATE contacts SET last_interaction = ?1 WHERE contact_id = ?2",
                params![now, contact_id.0],
            )?;
            Ok(())
        })
        .await
    }

    /// Sets or clears the pause flag (§4.9). Emits `ContactPaused`/`ContactResumed`.
    pub async fn set_paused(
        &self,
        tenant_id: TenantId,
        contact_id: ContactId,
        paused: bool,
        by: Option<String>,
    ) -> Result<(), StoreError> {
        self.with_conn(move |db| {
            let now = chrono::Utc::now().to_rfc3339();
            db.execute(
                "UPDATE contacts SET paused = ?1, paused_at = ?2, paused_by = ?3
                 WHERE contact_id = ?4",
                params![paused as i64, now, by, contact_id.0],
            )?;
            Ok(())
        })
        .await?;
        self.publish(if paused {
            StoreEvent::ContactPaused { tenant_id, contact_id }
        } else {
            StoreEvent::ContactResumed { tenant_id, contact_id }
        });
        Ok(())
    }

    /// Inserts an incoming message idempotently on `provider_message_id`
    /// (spec §8: "exactly one `direction=incoming` row is persisted per
    /// record"). Returns `(message, true)` if this call inserted the row,
    /// `(message, false)` if it already existed from a prior delivery.
    #[instrument(skip(self, msg))]
    pub async fn insert_incoming_message(
        &self,
        msg: NewMessage,
    ) -> Result<(Message, bool), StoreError> {
        self.with_conn(move |db| {
            let now = chrono::Utc::now().to_rfc3339();
            let metadata = serde_json::to_string(&msg.metadata)?;

            if let Some(pmid) = &msg.provider_message_id {
                if let Some(existing) = db
                    .query_row(
                        "SELECT message_id, provider_message_id, contact_id, tenant_id,
                                chatbot_id, direction, message_type, content_text, content_url,
                                status, sent_at, metadata, user_sent, ai_processed,
                                processing_duration_ms
                         FROM messages WHERE provider_message_id = ?1",
                        params![pmid],
                        row_to_message,
                    )
                    .optional()?
                {
                    return Ok((existing, false));
                }
            }

            db.execute(
                "INSERT INTO messages
                 (provider_message_id, contact_id, tenant_id, chatbot_id, direction,
                  message_type, content_text, content_url, status, sent_at, metadata,
                  user_sent, ai_processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    msg.provider_message_id,
                    msg.contact_id.0,
                    msg.tenant_id.0,
                    msg.chatbot_id.0,
                    msg.direction.to_string(),
                    message_type_str(msg.message_type),
                    msg.content_text,
                    msg.content_url,
                    msg.status.to_string(),
                    now,
                    metadata,
                    msg.user_sent as i64,
                    msg.ai_processed as i64,
                ],
            )?;
            let id = db.last_insert_rowid();
            let inserted = db
                .query_row(
                    "SELECT message_id, provider_message_id, contact_id, tenant_id,
                            chatbot_id, direction, message_type, content_text, content_url,
                            status, sent_at, metadata, user_sent, ai_processed,
                            processing_duration_ms
                     FROM messages WHERE message_id = ?1",
                    params![id],
                    row_to_message,
                )?;
            Ok((inserted, true))
        })
        .await
        .map(|(m, is_new)| {
            if is_new {
                self.publish(StoreEvent::MessageIncoming {
                    tenant_id: m.tenant_id,
                    message_id: m.message_id,
                    contact_id: m.contact_id,
                });
            }
            (m, is_new)
        })
    }

    /// Generic insert for outgoing/manual/internal messages. Broadcasts the
    /// matching event.
    pub async fn insert_message(&self, msg: NewMessage) -> Result<Message, StoreError> {
        let direction = msg.direction;
        let inserted = self
            .with_conn(move |db| {
                let now = chrono::Utc::now().to_rfc3339();
                let metadata = serde_json::to_string(&msg.metadata)?;
                db.execute(
                    "INSERT INTO messages
                     (provider_message_id, contact_id, tenant_id, chatbot_id, direction,
                      message_type, content_text, content_url, status, sent_at, metadata,
                      user_sent, ai_processed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        msg.provider_message_id,
                        msg.contact_id.0,
                        msg.tenant_id.0,
                        msg.chatbot_id.0,
                        msg.direction.to_string(),
                        message_type_str(msg.message_type),
                        msg.content_text,
                        msg.content_url,
                        msg.status.to_string(),
                        now,
                        metadata,
                        msg.user_sent as i64,
                        msg.ai_processed as i64,
                    ],
                )?;
                let id = db.last_insert_rowid();
                db.query_row(
                    "SELECT message_id, provider_message_id, contact_id, tenant_id,
                            chatbot_id, direction, message_type, content_text, content_url,
                            status, sent_at, metadata, user_sent, ai_processed,
                            processing_duration_ms
                     FROM messages WHERE message_id = ?1",
                    params![id],
                    row_to_message,
                )
                .map_err(StoreError::Database)
            })
            .await?;

        let event = match direction {
            MessageDirection::Outgoing => Some(StoreEvent::MessageOutgoing {
                tenant_id: inserted.tenant_id,
                message_id: inserted.message_id,
                contact_id: inserted.contact_id,
            }),
            MessageDirection::Manual => Some(StoreEvent::MessageManual {
                tenant_id: inserted.tenant_id,
                message_id: inserted.message_id,
                contact_id: inserted.contact_id,
            }),
            // Internal diagnostics are never transmitted or broadcast (§3).
            MessageDirection::Internal => None,
            MessageDirection::Incoming => None,
        };
        if let Some(event) = event {
            self.publish(event);
        }
        Ok(inserted)
    }

    /// Updates `Message.status` by `provider_message_id` (delivery-status
    /// callback, §4.1). Unknown ids are dropped with a warning, never an error.
    pub async fn update_status_by_provider_id(
        &self,
        provider_message_id: String,
        status: MessageStatus,
    ) -> Result<Option<Message>, StoreError> {
        let updated = self
            .with_conn({
                let status = status;
                move |db| {
                    db.execute(
                        "UPDATE messages SET status = ?1 WHERE provider_message_id = ?2",
                        params![status.to_string(), provider_message_id],
                    )?;
                    db.query_row(
                        "SELECT message_id, provider_message_id, contact_id, tenant_id,
                                chatbot_id, direction, message_type, content_text, content_url,
                                status, sent_at, metadata, user_sent, ai_processed,
                                processing_duration_ms
                         FROM messages WHERE provider_message_id = ?1",
                        params![provider_message_id],
                        row_to_message,
                    )
                    .optional()
                    .map_err(StoreError::Database)
                }
            })
            .await?;

        match &updated {
            Some(m) => self.publish(StoreEvent::MessageStatusChanged {
                tenant_id: m.tenant_id,
                message_id: m.message_id,
                status,
            }),
            None => warn!("status callback for unknown provider_message_id"),
        }
        Ok(updated)
    }

    pub async fn get_message(&self, message_id: MessageId) -> Result<Option<Message>, StoreError> {
        self.with_conn(move |db| {
            db.query_row(
                "SELECT message_id, provider_message_id, contact_id, tenant_id,
                        chatbot_id, direction, message_type, content_text, content_url,
                        status, sent_at, metadata, user_sent, ai_processed,
                        processing_duration_ms
                 FROM messages WHERE message_id = ?1",
                params![message_id.0],
                row_to_message,
            )
            .optional()
            .map_err(StoreError::Database)
        })
        .await
    }

    pub async fn update_message_status(
        &self,
        message_id: MessageId,
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        self.with_conn(move |db| {
            db.execute(
                "UPDATE messages SET status = ?1 WHERE message_id = ?2",
                params![status.to_string(), message_id.0],
            )?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, new_action))]
    pub async fn create_action(&self, new_action: NewAction) -> Result<Action, StoreError> {
        let tenant_id = new_action.tenant_id;
        let action = self
            .with_conn(move |db| {
                let now = chrono::Utc::now().to_rfc3339();
                let data = serde_json::to_string(&new_action.request_data)?;
                db.execute(
                    "INSERT INTO actions
                     (tenant_id, chatbot_id, contact_id, request_type, request_details,
                      request_data, priority, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
                    params![
                        new_action.tenant_id.0,
                        new_action.chatbot_id.0,
                        new_action.contact_id.0,
                        new_action.request_type,
                        new_action.request_details,
                        data,
                        priority_str(new_action.priority),
                        now,
                    ],
                )?;
                let id = db.last_insert_rowid();
                db.query_row(
                    "SELECT action_id, tenant_id, chatbot_id, contact_id, request_type,
                            request_details, request_data, priority, status, user_response,
                            response_data, created_at, resolved_at, expires_at
                     FROM actions WHERE action_id = ?1",
                    params![id],
                    row_to_action,
                )
                .map_err(StoreError::Database)
            })
            .await?;
        self.publish(StoreEvent::ActionCreated { tenant_id, action_id: action.action_id });
        Ok(action)
    }

    pub async fn get_action(&self, action_id: ActionId) -> Result<Option<Action>, StoreError> {
        self.with_conn(move |db| {
            db.query_row(
                "SELECT action_id, tenant_id, chatbot_id, contact_id, request_type,
                        request_details, request_data, priority, status, user_response,
                        response_data, created_at, resolved_at, expires_at
                 FROM actions WHERE action_id = ?1",
                params![action_id.0],
                row_to_action,
            )
            .optional()
            .map_err(StoreError::Database)
        })
        .await
    }

    /// Resolves a pending Action. Idempotent by `(action_id, status)` — a
    /// repeat call against an already-resolved Action is a no-op that
    /// returns the existing row unchanged, never re-broadcasting (spec §8).
    pub async fn resolve_action(
        &self,
        action_id: ActionId,
        status: ActionStatus,
        user_response: Option<String>,
        response_data: Option<serde_json::Value>,
    ) -> Result<Option<(Action, bool)>, StoreError> {
        let result = self
            .with_conn(move |db| {
                let current = db
                    .query_row(
                        "SELECT action_id, tenant_id, chatbot_id, contact_id, request_type,
                                request_details, request_data, priority, status, user_response,
                                response_data, created_at, resolved_at, expires_at
                         FROM actions WHERE action_id = ?1",
                        params![action_id.0],
                        row_to_action,
                    )
                    .optional()?;
                let Some(current) = current else { return Ok(None) };
                if current.status.is_terminal() {
                    return Ok(Some((current, false)));
                }
                let now = chrono::Utc::now().to_rfc3339();
                let data = response_data
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                db.execute(
                    "UPDATE actions SET status = ?1, user_response = ?2, response_data = ?3,
                     resolved_at = ?4 WHERE action_id = ?5",
                    params![status.to_string(), user_response, data, now, action_id.0],
                )?;
                let updated = db.query_row(
                    "SELECT action_id, tenant_id, chatbot_id, contact_id, request_type,
                            request_details, request_data, priority, status, user_response,
                            response_data, created_at, resolved_at, expires_at
                     FROM actions WHERE action_id = ?1",
                    params![action_id.0],
                    row_to_action,
                )?;
                Ok(Some((updated, true)))
            })
            .await?;

        if let Some((action, true)) = &result {
            self.publish(StoreEvent::ActionResolved {
                tenant_id: action.tenant_id,
                action_id: action.action_id,
                status: action.status,
            });
        }
        Ok(result)
    }

    /// Today's usage row, created lazily on first use (spec §3 invariant).
    pub async fn get_usage_today(&self, tenant_id: TenantId) -> Result<UsageCounter, StoreError> {
        self.with_conn(move |db| {
            let today = chrono::Utc::now().date_naive();
            let row: Option<(u64, u64)> = db
                .query_row(
                    "SELECT outbound_count, campaign_count FROM usage_counters
                     WHERE tenant_id = ?1 AND date = ?2",
                    params![tenant_id.0, today.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (outbound_count, campaign_count) = row.unwrap_or((0, 0));
            Ok(UsageCounter { tenant_id, date: today, outbound_count, campaign_count })
        })
        .await
    }

    /// Atomic increment — the post-increment step around each outbound
    /// message (§4.7). Uses `ON CONFLICT ... DO UPDATE` so the lazily
    /// created row and the increment happen in one statement.
    pub async fn increment_outbound(&self, tenant_id: TenantId) -> Result<u64, StoreError> {
        self.with_conn(move |db| {
            let today = chrono::Utc::now().date_naive().to_string();
            db.execute(
                "INSERT INTO usage_counters (tenant_id, date, outbound_count, campaign_count)
                 VALUES (?1, ?2, 1, 0)
                 ON CONFLICT(tenant_id, date) DO UPDATE SET
                    outbound_count = outbound_count + 1",
                params![tenant_id.0, today],
            )?;
            let count: u64 = db.query_row(
                "SELECT outbound_count FROM usage_counters WHERE tenant_id = ?1 AND date = ?2",
                params![tenant_id.0, today],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Monthly roll-up derived by aggregation (spec §3).
    pub async fn get_monthly_outbound(
        &self,
        tenant_id: TenantId,
        year: i32,
        month: u32,
    ) -> Result<u64, StoreError> {
        self.with_conn(move |db| {
            let prefix = format!("{:04}-{:02}", year, month);
            let total: u64 = db.query_row(
                "SELECT COALESCE(SUM(outbound_count), 0) FROM usage_counters
                 WHERE tenant_id = ?1 AND date LIKE ?2",
                params![tenant_id.0, format!("{}%", prefix)],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
    }

    /// Upserts a catalog entry keyed by `(chatbot_id, category, question)`
    /// (§4.1 provider catalog webhook) and syncs the FTS index, the same
    /// delete+insert discipline the teacher's memory FTS sync uses.
    pub async fn upsert_knowledge(
        &self,
        tenant_id: TenantId,
        chatbot_id: ChatbotId,
        category: String,
        question: String,
        answer: String,
    ) -> Result<KnowledgeEntry, StoreError> {
        self.with_conn(move |db| {
            let existing: Option<i64> = db
                .query_row(
                    "SELECT id FROM knowledge_entries
                     WHERE chatbot_id = ?1 AND category = ?2 AND question = ?3",
                    params![chatbot_id.0, category, question],
                    |row| row.get(0),
                )
                .optional()?;

            let id = if let Some(id) = existing {
                db.execute(
                    "UPDATE knowledge_entries SET answer = ?1, is_active = 1 WHERE id = ?2",
                    params![answer, id],
                )?;
                db.execute(
                    "INSERT INTO knowledge_entries_fts(knowledge_entries_fts, rowid, question, answer)
                     VALUES('delete', ?1, ?2, ?3)",
                    params![id, question, answer],
                )?;
                db.execute(
                    "INSERT INTO knowledge_entries_fts(rowid, question, answer) VALUES(?1, ?2, ?3)",
                    params![id, question, answer],
                )?;
                id
            } else {
                db.execute(
                    "INSERT INTO knowledge_entries
                     (tenant_id, chatbot_id, category, question, answer, is_active)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                    params![tenant_id.0, chatbot_id.0, category, question, answer],
                )?;
                let id = db.last_insert_rowid();
                db.execute(
                    "INSERT INTO knowledge_entries_fts(rowid, question, answer) VALUES(?1, ?2, ?3)",
                    params![id, question, answer],
                )?;
                id
            };

            db.query_row(
                "SELECT id, tenant_id, chatbot_id, category, question, answer, is_active
                 FROM knowledge_entries WHERE id = ?1",
                params![id],
                |row| {
                    Ok(KnowledgeEntry {
                        id: row.get(0)?,
                        tenant_id: TenantId(row.get(1)?),
                        chatbot_id: ChatbotId(row.get(2)?),
                        category: row.get(3)?,
                        question: row.get(4)?,
                        answer: row.get(5)?,
                        is_active: row.get::<_, i64>(6)? != 0,
                    })
                },
            )
            .map_err(StoreError::Database)
        })
        .await
    }
}

fn message_type_str(t: wabroker_core::types::MessageType) -> &'static str {
    use wabroker_core::types::MessageType::*;
    match t {
        Text => "text",
        Image => "image",
        Audio => "audio",
        Document => "document",
        Location => "location",
        Template => "template",
        ActionIndicator => "action_indicator",
    }
}

fn priority_str(p: ActionPriority) -> &'static str {
    match p {
        ActionPriority::Low => "low",
        ActionPriority::Medium => "medium",
        ActionPriority::High => "high",
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let custom_fields_raw: String = row.get(10)?;
    Ok(Contact {
        contact_id: ContactId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        chatbot_id: ChatbotId(row.get(2)?),
        phone_number: row.get(3)?,
        display_name: row.get(4)?,
        thread_id: row.get(5)?,
        paused: row.get::<_, i64>(6)? != 0,
        paused_at: row.get(7)?,
        paused_by: row.get(8)?,
        last_interaction: row.get(9)?,
        custom_fields: serde_json::from_str(&custom_fields_raw).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let direction_str: String = row.get(5)?;
    let type_str: String = row.get(6)?;
    let status_str: String = row.get(9)?;
    let metadata_raw: String = row.get(11)?;
    Ok(Message {
        message_id: MessageId(row.get(0)?),
        provider_message_id: row.get(1)?,
        contact_id: ContactId(row.get(2)?),
        tenant_id: TenantId(row.get(3)?),
        chatbot_id: ChatbotId(row.get(4)?),
        direction: parse_direction(&direction_str),
        message_type: parse_message_type(&type_str),
        content_text: row.get(7)?,
        content_url: row.get(8)?,
        status: parse_status(&status_str),
        sent_at: row.get(10)?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        user_sent: row.get::<_, i64>(12)? != 0,
        ai_processed: row.get::<_, i64>(13)? != 0,
        processing_duration_ms: row.get(14)?,
    })
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<Action> {
    let priority_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let request_data_raw: String = row.get(6)?;
    let response_data_raw: Option<String> = row.get(10)?;
    Ok(Action {
        action_id: ActionId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        chatbot_id: ChatbotId(row.get(2)?),
        contact_id: ContactId(row.get(3)?),
        request_type: row.get(4)?,
        request_details: row.get(5)?,
        request_data: serde_json::from_str(&request_data_raw).unwrap_or(serde_json::Value::Null),
        priority: parse_priority(&priority_str),
        status: parse_action_status(&status_str),
        user_response: row.get(9)?,
        response_data: response_data_raw.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(11)?,
        resolved_at: row.get(12)?,
        expires_at: row.get(13)?,
    })
}

fn parse_direction(s: &str) -> MessageDirection {
    match s {
        "incoming" => MessageDirection::Incoming,
        "outgoing" => MessageDirection::Outgoing,
        "manual" => MessageDirection::Manual,
        _ => MessageDirection::Internal,
    }
}

fn parse_message_type(s: &str) -> wabroker_core::types::MessageType {
    use wabroker_core::types::MessageType::*;
    match s {
        "image" => Image,
        "audio" => Audio,
        "document" => Document,
        "location" => Location,
        "template" => Template,
        "action_indicator" => ActionIndicator,
        _ => Text,
    }
}

fn parse_status(s: &str) -> MessageStatus {
    match s {
        "sent" => MessageStatus::Sent,
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

fn parse_priority(s: &str) -> ActionPriority {
    match s {
        "low" => ActionPriority::Low,
        "high" => ActionPriority::High,
        _ => ActionPriority::Medium,
    }
}

fn parse_action_status(s: &str) -> ActionStatus {
    match s {
        "approved" => ActionStatus::Approved,
        "denied" => ActionStatus::Denied,
        "cancelled" => ActionStatus::Cancelled,
        _ => ActionStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabroker_core::types::MessageType;

    fn test_store() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        Store::new(conn)
    }

    #[tokio::test]
    async fn get_or_create_contact_is_idempotent() {
        let store = test_store();
        let a = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();
        let b = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();
        assert_eq!(a.contact_id, b.contact_id);
    }

    #[tokio::test]
    async fn same_phone_different_tenants_creates_distinct_contacts() {
        let store = test_store();
        let a = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();
        let b = store
            .get_or_create_contact(TenantId(2), ChatbotId(2), "9999".into(), None)
            .await
            .unwrap();
        assert_ne!(a.contact_id, b.contact_id);
        assert_ne!(a.tenant_id, b.tenant_id);
    }

    #[tokio::test]
    async fn redelivered_provider_message_id_is_not_duplicated() {
        let store = test_store();
        let contact = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();
        let msg = NewMessage::incoming(
            TenantId(1),
            ChatbotId(1),
            contact.contact_id,
            Some("wamid.123".into()),
            MessageType::Text,
            Some("hi".into()),
            None,
        );
        let (first, first_new) = store.insert_incoming_message(msg.clone()).await.unwrap();
        let (second, second_new) = store.insert_incoming_message(msg).await.unwrap();
        assert!(first_new);
        assert!(!second_new);
        assert_eq!(first.message_id, second.message_id);
    }

    #[tokio::test]
    async fn resolve_action_is_idempotent() {
        let store = test_store();
        let contact = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();
        let action = store
            .create_action(NewAction {
                tenant_id: TenantId(1),
                chatbot_id: ChatbotId(1),
                contact_id: contact.contact_id,
                request_type: "refund_request".into(),
                request_details: "refund order #1001".into(),
                request_data: serde_json::json!({}),
                priority: ActionPriority::High,
            })
            .await
            .unwrap();

        let (first, changed1) = store
            .resolve_action(action.action_id, ActionStatus::Approved, None, None)
            .await
            .unwrap()
            .unwrap();
        let (second, changed2) = store
            .resolve_action(action.action_id, ActionStatus::Approved, None, None)
            .await
            .unwrap()
            .unwrap();
        assert!(changed1);
        assert!(!changed2);
        assert_eq!(first.status, second.status);
    }

    #[tokio::test]
    async fn increment_outbound_is_atomic_per_day() {
        let store = test_store();
        let first = store.increment_outbound(TenantId(1)).await.unwrap();
        let second = store.increment_outbound(TenantId(1)).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }
}
