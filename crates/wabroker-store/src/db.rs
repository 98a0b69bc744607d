use rusqlite::{Connection, Result};

/// Initialise broker tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    create_contacts_table(conn)?;
    create_messages_table(conn)?;
    create_actions_table(conn)?;
    create_usage_counters_table(conn)?;
    create_knowledge_table(conn)?;
    Ok(())
}

fn create_contacts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS contacts (
            contact_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id       INTEGER NOT NULL,
            chatbot_id      INTEGER NOT NULL,
            phone_number    TEXT NOT NULL,
            display_name    TEXT,
            thread_id       TEXT NOT NULL,
            paused          INTEGER NOT NULL DEFAULT 0,
            paused_at       TEXT,
            paused_by       TEXT,
            last_interaction TEXT,
            custom_fields   TEXT NOT NULL DEFAULT '{}',
            UNIQUE(tenant_id, phone_number)
        );
        CREATE INDEX IF NOT EXISTS idx_contacts_tenant
            ON contacts(tenant_id);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            message_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_message_id TEXT,
            contact_id      INTEGER NOT NULL REFERENCES contacts(contact_id),
            tenant_id       INTEGER NOT NULL,
            chatbot_id      INTEGER NOT NULL,
            direction       TEXT NOT NULL,
            message_type    TEXT NOT NULL,
            content_text    TEXT,
            content_url     TEXT,
            status          TEXT NOT NULL,
            sent_at         TEXT NOT NULL,
            metadata        TEXT NOT NULL DEFAULT 'null',
            user_sent       INTEGER NOT NULL DEFAULT 0,
            ai_processed    INTEGER NOT NULL DEFAULT 0,
            processing_duration_ms INTEGER,
            UNIQUE(provider_message_id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_contact
            ON messages(contact_id, sent_at);
        CREATE INDEX IF NOT EXISTS idx_messages_tenant
            ON messages(tenant_id, sent_at DESC);",
    )
}

fn create_actions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS actions (
            action_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id       INTEGER NOT NULL,
            chatbot_id      INTEGER NOT NULL,
            contact_id      INTEGER NOT NULL REFERENCES contacts(contact_id),
            request_type    TEXT NOT NULL,
            request_details TEXT NOT NULL,
            request_data    TEXT NOT NULL DEFAULT '{}',
            priority        TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            user_response   TEXT,
            response_data   TEXT,
            created_at      TEXT NOT NULL,
            resolved_at     TEXT,
            expires_at      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_actions_tenant_status
            ON actions(tenant_id, status);",
    )
}

fn create_usage_counters_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage_counters (
            tenant_id       INTEGER NOT NULL,
            date            TEXT NOT NULL,
            outbound_count  INTEGER NOT NULL DEFAULT 0,
            campaign_count  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, date)
        );",
    )
}

/// FTS5 external-content table for knowledge base search — synced manually
/// on write, same as the teacher's `user_memory_fts`.
fn create_knowledge_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge_entries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id       INTEGER NOT NULL,
            chatbot_id      INTEGER NOT NULL,
            category        TEXT NOT NULL,
            question        TEXT NOT NULL,
            answer          TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            UNIQUE(chatbot_id, category, question)
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_entries_fts
            USING fts5(question, answer, content='knowledge_entries', content_rowid='id');",
    )
}
