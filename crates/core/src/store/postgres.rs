//! Postgres-backed record store

use async_trait::async_trait;
use chatline_shared::{
    AgentProfile, AgentStatus, Attachment, Chat, ChatMessage, CoreError, CoreResult, Notification,
    NotificationKind, QueueStats,
};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ChatStore, NewMessage};

const CHAT_COLUMNS: &str = "id, client_id, agent_id, status::text AS status, \
                            created_at, started_at, ended_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, sender_role::text AS sender_role, body, \
                               attachment_url, attachment_kind, attachment_name, attachment_size, \
                               seq, created_at";

/// Record store over a shared Postgres pool
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ChatRow {
    id: Uuid,
    client_id: Uuid,
    agent_id: Option<Uuid>,
    status: String,
    created_at: OffsetDateTime,
    started_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
}

impl TryFrom<ChatRow> for Chat {
    type Error = CoreError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        Ok(Chat {
            id: row.id,
            client_id: row.client_id,
            agent_id: row.agent_id,
            status: row.status.parse().map_err(CoreError::Database)?,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    sender_role: String,
    body: Option<String>,
    attachment_url: Option<String>,
    attachment_kind: Option<String>,
    attachment_name: Option<String>,
    attachment_size: Option<i64>,
    seq: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = CoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let attachment = row.attachment_url.map(|url| Attachment {
            url,
            kind: row.attachment_kind.unwrap_or_default(),
            name: row.attachment_name.unwrap_or_default(),
            size: row.attachment_size.unwrap_or(0),
        });

        Ok(ChatMessage {
            id: row.id,
            chat_id: row.chat_id,
            sender_id: row.sender_id,
            sender_role: row.sender_role.parse().map_err(CoreError::Database)?,
            body: row.body,
            attachment,
            seq: row.seq,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    role: String,
    status: String,
}

impl TryFrom<UserRow> for AgentProfile {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(AgentProfile {
            id: row.id,
            role: row.role.parse().map_err(CoreError::Database)?,
            status: row.status.parse().map_err(CoreError::Database)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    body: String,
    chat_id: Option<Uuid>,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse().map_err(CoreError::Database)?,
            body: row.body,
            chat_id: row.chat_id,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// ChatStore implementation
// =============================================================================

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_chat(&self, client_id: Uuid) -> CoreResult<Chat> {
        let row: ChatRow = sqlx::query_as(&format!(
            "INSERT INTO chats (client_id) VALUES ($1) RETURNING {CHAT_COLUMNS}"
        ))
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>> {
        let row: Option<ChatRow> =
            sqlx::query_as(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_open_chat_for_client(&self, client_id: Uuid) -> CoreResult<Option<Chat>> {
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHAT_COLUMNS}
            FROM chats
            WHERE client_id = $1 AND status IN ('queued', 'active')
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn claim_chat(&self, chat_id: Uuid, agent_id: Uuid) -> CoreResult<bool> {
        // The whole engine's at-most-once guarantee rides on this being a
        // single conditional update, never a read-then-write.
        let result = sqlx::query(
            r#"
            UPDATE chats
            SET agent_id = $2, status = 'active', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND agent_id IS NULL AND status = 'queued'
            "#,
        )
        .bind(chat_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn end_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>> {
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            r#"
            UPDATE chats
            SET status = 'ended', ended_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status <> 'ended'
            RETURNING {CHAT_COLUMNS}
            "#
        ))
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_queued(&self, limit: i64) -> CoreResult<Vec<Chat>> {
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CHAT_COLUMNS}
            FROM chats
            WHERE status = 'queued' AND agent_id IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn queued_position(&self, chat: &Chat) -> CoreResult<i64> {
        let position: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM chats
            WHERE status = 'queued' AND agent_id IS NULL AND created_at <= $1
            "#,
        )
        .bind(chat.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(position)
    }

    async fn insert_message(&self, draft: &NewMessage) -> CoreResult<ChatMessage> {
        let attachment = draft.attachment.as_ref();
        let row: MessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO chat_messages
                (chat_id, sender_id, sender_role, body,
                 attachment_url, attachment_kind, attachment_name, attachment_size)
            VALUES ($1, $2, $3::user_role, $4, $5, $6, $7, $8)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(draft.chat_id)
        .bind(draft.sender_id)
        .bind(draft.sender_role.as_str())
        .bind(&draft.body)
        .bind(attachment.map(|a| a.url.as_str()))
        .bind(attachment.map(|a| a.kind.as_str()))
        .bind(attachment.map(|a| a.name.as_str()))
        .bind(attachment.map(|a| a.size))
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_messages(&self, chat_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM chat_messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, seq ASC
            "#
        ))
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_user(&self, user_id: Uuid) -> CoreResult<Option<AgentProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, role::text AS role, status::text AS status FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_available_agents_by_load(&self) -> CoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT u.id
            FROM users u
            LEFT JOIN chats c ON c.agent_id = u.id AND c.status = 'active'
            WHERE u.role IN ('support', 'admin') AND u.status = 'available'
            GROUP BY u.id
            ORDER BY COUNT(c.id) ASC, u.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn count_active_chats_for_agent(&self, agent_id: Uuid) -> CoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chats WHERE agent_id = $1 AND status = 'active'",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn set_agent_status(&self, agent_id: Uuid, status: AgentStatus) -> CoreResult<()> {
        sqlx::query("UPDATE users SET status = $2::agent_status, updated_at = NOW() WHERE id = $1")
            .bind(agent_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_agent_ids(&self) -> CoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE role IN ('support', 'admin') ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        body: &str,
        chat_id: Option<Uuid>,
    ) -> CoreResult<Notification> {
        let row: NotificationRow = sqlx::query_as(
            r#"
            INSERT INTO notifications (user_id, kind, body, chat_id)
            VALUES ($1, $2::notification_kind, $3, $4)
            RETURNING id, user_id, kind::text AS kind, body, chat_id, is_read, created_at
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(body)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_notifications(&self, user_id: Uuid) -> CoreResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, kind::text AS kind, body, chat_id, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> CoreResult<bool> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn queue_stats(&self) -> CoreResult<QueueStats> {
        let (queued, active, available_agents): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'queued' AND agent_id IS NULL) AS queued,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                (SELECT COUNT(*) FROM users
                 WHERE role IN ('support', 'admin') AND status = 'available') AS available_agents
            FROM chats
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            queued,
            active,
            available_agents,
        })
    }
}
