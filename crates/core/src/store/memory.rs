//! In-memory record store
//!
//! Backs the engine test suite. All tables live behind a single async mutex,
//! which makes the conditional claim and terminal transition atomic exactly
//! like their single-statement Postgres counterparts.

use async_trait::async_trait;
use chatline_shared::{
    AgentProfile, AgentStatus, Chat, ChatMessage, ChatStatus, CoreError, CoreResult, Notification,
    NotificationKind, QueueStats, UserRole,
};
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatStore, NewMessage};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, AgentProfile>,
    chats: HashMap<Uuid, Chat>,
    messages: Vec<ChatMessage>,
    notifications: Vec<Notification>,
    next_seq: i64,
    last_ts: Option<OffsetDateTime>,
}

impl Inner {
    // Strictly increasing timestamps keep FIFO order stable even when rows
    // are created within the same clock tick.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        let mut ts = OffsetDateTime::now_utc();
        if let Some(last) = self.last_ts {
            if ts <= last {
                ts = last + Duration::microseconds(1);
            }
        }
        self.last_ts = Some(ts);
        ts
    }

    fn queued(&self) -> Vec<Chat> {
        let mut queued: Vec<Chat> = self
            .chats
            .values()
            .filter(|c| c.status == ChatStatus::Queued && c.agent_id.is_none())
            .cloned()
            .collect();
        queued.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        queued
    }
}

/// In-memory store with the same conditional-update semantics as Postgres
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user row (test setup)
    pub async fn add_user(&self, id: Uuid, role: UserRole, status: AgentStatus) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(id, AgentProfile { id, role, status });
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_chat(&self, client_id: Uuid) -> CoreResult<Chat> {
        let mut inner = self.inner.lock().await;
        let now = inner.next_timestamp();
        let chat = Chat {
            id: Uuid::new_v4(),
            client_id,
            agent_id: None,
            status: ChatStatus::Queued,
            created_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        };
        inner.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>> {
        let inner = self.inner.lock().await;
        Ok(inner.chats.get(&chat_id).cloned())
    }

    async fn find_open_chat_for_client(&self, client_id: Uuid) -> CoreResult<Option<Chat>> {
        let inner = self.inner.lock().await;
        let mut open: Vec<&Chat> = inner
            .chats
            .values()
            .filter(|c| {
                c.client_id == client_id
                    && matches!(c.status, ChatStatus::Queued | ChatStatus::Active)
            })
            .collect();
        open.sort_by_key(|c| c.created_at);
        Ok(open.first().map(|c| (*c).clone()))
    }

    async fn claim_chat(&self, chat_id: Uuid, agent_id: Uuid) -> CoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let now = inner.next_timestamp();
        let Some(chat) = inner.chats.get_mut(&chat_id) else {
            return Ok(false);
        };
        if chat.agent_id.is_some() || chat.status != ChatStatus::Queued {
            return Ok(false);
        }
        chat.agent_id = Some(agent_id);
        chat.status = ChatStatus::Active;
        chat.started_at = Some(now);
        chat.updated_at = now;
        Ok(true)
    }

    async fn end_chat(&self, chat_id: Uuid) -> CoreResult<Option<Chat>> {
        let mut inner = self.inner.lock().await;
        let now = inner.next_timestamp();
        let Some(chat) = inner.chats.get_mut(&chat_id) else {
            return Ok(None);
        };
        if chat.status == ChatStatus::Ended {
            return Ok(None);
        }
        chat.status = ChatStatus::Ended;
        chat.ended_at = Some(now);
        chat.updated_at = now;
        Ok(Some(chat.clone()))
    }

    async fn list_queued(&self, limit: i64) -> CoreResult<Vec<Chat>> {
        let inner = self.inner.lock().await;
        Ok(inner.queued().into_iter().take(limit as usize).collect())
    }

    async fn queued_position(&self, chat: &Chat) -> CoreResult<i64> {
        let inner = self.inner.lock().await;
        let position = inner
            .queued()
            .iter()
            .filter(|c| c.created_at <= chat.created_at)
            .count();
        Ok(position as i64)
    }

    async fn insert_message(&self, draft: &NewMessage) -> CoreResult<ChatMessage> {
        let mut inner = self.inner.lock().await;
        if !inner.chats.contains_key(&draft.chat_id) {
            return Err(CoreError::ChatNotFound);
        }
        let now = inner.next_timestamp();
        inner.next_seq += 1;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: draft.chat_id,
            sender_id: draft.sender_id,
            sender_role: draft.sender_role,
            body: draft.body.clone(),
            attachment: draft.attachment.clone(),
            seq: inner.next_seq,
            created_at: now,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, chat_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
        Ok(messages)
    }

    async fn get_user(&self, user_id: Uuid) -> CoreResult<Option<AgentProfile>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn find_available_agents_by_load(&self) -> CoreResult<Vec<Uuid>> {
        let inner = self.inner.lock().await;
        let mut candidates: Vec<(i64, Uuid)> = inner
            .users
            .values()
            .filter(|u| u.role.is_agent() && u.status == AgentStatus::Available)
            .map(|u| {
                let active = inner
                    .chats
                    .values()
                    .filter(|c| c.agent_id == Some(u.id) && c.status == ChatStatus::Active)
                    .count() as i64;
                (active, u.id)
            })
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().map(|(_, id)| id).collect())
    }

    async fn count_active_chats_for_agent(&self, agent_id: Uuid) -> CoreResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .chats
            .values()
            .filter(|c| c.agent_id == Some(agent_id) && c.status == ChatStatus::Active)
            .count() as i64)
    }

    async fn set_agent_status(&self, agent_id: Uuid, status: AgentStatus) -> CoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&agent_id) {
            user.status = status;
        }
        Ok(())
    }

    async fn list_agent_ids(&self) -> CoreResult<Vec<Uuid>> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<Uuid> = inner
            .users
            .values()
            .filter(|u| u.role.is_agent())
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        body: &str,
        chat_id: Option<Uuid>,
    ) -> CoreResult<Notification> {
        let mut inner = self.inner.lock().await;
        let now = inner.next_timestamp();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            body: body.to_string(),
            chat_id,
            is_read: false,
            created_at: now,
        };
        inner.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, user_id: Uuid) -> CoreResult<Vec<Notification>> {
        let inner = self.inner.lock().await;
        let mut list: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> CoreResult<bool> {
        let mut inner = self.inner.lock().await;
        for notification in inner.notifications.iter_mut() {
            if notification.id == id && notification.user_id == user_id {
                notification.is_read = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn queue_stats(&self) -> CoreResult<QueueStats> {
        let inner = self.inner.lock().await;
        let queued = inner.queued().len() as i64;
        let active = inner
            .chats
            .values()
            .filter(|c| c.status == ChatStatus::Active)
            .count() as i64;
        let available_agents = inner
            .users
            .values()
            .filter(|u| u.role.is_agent() && u.status == AgentStatus::Available)
            .count() as i64;
        Ok(QueueStats {
            queued,
            active,
            available_agents,
        })
    }
}
