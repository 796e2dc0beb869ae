//! Record-store seam
//!
//! The store is the source of truth for chats, messages, agents and
//! notifications; the engine never keeps queue state of its own. All
//! contended writes (the chat claim, the terminal transition) are single
//! conditional updates so that concurrent attempts can branch on whether
//! they won.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgChatStore;

use async_trait::async_trait;
use chatline_shared::{
    AgentProfile, AgentStatus, Attachment, Chat, ChatMessage, CoreResult, Notification,
    NotificationKind, QueueStats, UserRole,
};
use uuid::Uuid;

/// Draft of a message row to persist
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Operations the engine requires from the record store
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a chat in `queued` with no agent.
    async fn create_chat(&self, client_id: Uuid) -> CoreResult<Chat>;

    async fn get_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>>;

    /// The client's open (`queued` or `active`) chat, if any.
    async fn find_open_chat_for_client(&self, client_id: Uuid) -> CoreResult<Option<Chat>>;

    /// Conditional claim: sets `agent_id`, `status = active` and `started_at`
    /// only while the chat is still unassigned. Returns whether this attempt
    /// won the claim. A losing concurrent attempt observes `false`.
    async fn claim_chat(&self, chat_id: Uuid, agent_id: Uuid) -> CoreResult<bool>;

    /// Terminal transition: sets `status = ended` and `ended_at` exactly
    /// once. Returns the updated chat, or `None` if the chat is missing or
    /// already ended.
    async fn end_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>>;

    /// Unassigned queued chats, oldest first.
    async fn list_queued(&self, limit: i64) -> CoreResult<Vec<Chat>>;

    /// 1-based queue position: the count of unassigned queued chats created
    /// at or before this chat's `created_at`.
    async fn queued_position(&self, chat: &Chat) -> CoreResult<i64>;

    async fn insert_message(&self, draft: &NewMessage) -> CoreResult<ChatMessage>;

    /// Messages of a chat ordered by `created_at`, then insertion order.
    async fn list_messages(&self, chat_id: Uuid) -> CoreResult<Vec<ChatMessage>>;

    async fn get_user(&self, user_id: Uuid) -> CoreResult<Option<AgentProfile>>;

    /// Agents eligible for assignment (support/admin, `available`), ordered
    /// by ascending count of their active chats, ties by ascending id.
    async fn find_available_agents_by_load(&self) -> CoreResult<Vec<Uuid>>;

    async fn count_active_chats_for_agent(&self, agent_id: Uuid) -> CoreResult<i64>;

    async fn set_agent_status(&self, agent_id: Uuid, status: AgentStatus) -> CoreResult<()>;

    /// All support/admin user ids (queue_new notification recipients).
    async fn list_agent_ids(&self) -> CoreResult<Vec<Uuid>>;

    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        body: &str,
        chat_id: Option<Uuid>,
    ) -> CoreResult<Notification>;

    async fn list_notifications(&self, user_id: Uuid) -> CoreResult<Vec<Notification>>;

    /// Returns whether a row was updated.
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> CoreResult<bool>;

    async fn queue_stats(&self) -> CoreResult<QueueStats>;
}
