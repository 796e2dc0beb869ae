//! Notification side effects
//!
//! Appends durable notification rows and pushes a `new_notification` event
//! to the recipient's personal channel. Strictly fire-and-forget: a failed
//! write is logged with enough fields to diagnose, and the triggering
//! operation never sees the error.

use chatline_shared::NotificationKind;
use std::sync::Arc;
use uuid::Uuid;

use crate::realtime::{Audience, ConnectionRegistry, ServerEvent};
use crate::store::ChatStore;

pub struct Notifier<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
}

impl<S> Clone for Notifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: ChatStore> Notifier<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Record one notification and push it to the recipient
    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        body: String,
        chat_id: Option<Uuid>,
    ) {
        match self
            .store
            .insert_notification(user_id, kind, &body, chat_id)
            .await
        {
            Ok(notification) => {
                self.registry
                    .publish(
                        ServerEvent::NewNotification { notification },
                        Audience::User(user_id),
                    )
                    .await;
            }
            Err(error) => {
                // Swallowed on purpose, but loudly: notification loss must
                // stay diagnosable.
                tracing::warn!(
                    user_id = %user_id,
                    kind = %kind.as_str(),
                    chat_id = ?chat_id,
                    error = %error,
                    "failed to record notification"
                );
            }
        }
    }

    /// Tell an agent they were handed a chat
    pub async fn chat_assigned(&self, agent_id: Uuid, chat_id: Uuid) {
        self.notify(
            agent_id,
            NotificationKind::ChatAssigned,
            "A chat has been assigned to you".to_string(),
            Some(chat_id),
        )
        .await;
    }

    /// Tell the chat's agent the client wrote something
    pub async fn client_message(&self, agent_id: Uuid, chat_id: Uuid) {
        self.notify(
            agent_id,
            NotificationKind::NewMessage,
            "New message from a client in one of your chats".to_string(),
            Some(chat_id),
        )
        .await;
    }

    /// Tell every agent a new chat is waiting unassigned
    pub async fn queue_waiting(&self, chat_id: Uuid) {
        let agent_ids = match self.store.list_agent_ids().await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %error,
                    "failed to resolve queue_new recipients"
                );
                return;
            }
        };

        for agent_id in agent_ids {
            self.notify(
                agent_id,
                NotificationKind::QueueNew,
                "A new chat is waiting in the queue".to_string(),
                Some(chat_id),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chatline_shared::{AgentStatus, UserRole};

    #[tokio::test]
    async fn test_notify_records_row() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(Arc::clone(&store), registry);

        let agent = Uuid::new_v4();
        let chat = Uuid::new_v4();
        notifier.chat_assigned(agent, chat).await;

        let rows = store.list_notifications(agent).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, NotificationKind::ChatAssigned);
        assert_eq!(rows[0].chat_id, Some(chat));
        assert!(!rows[0].is_read);
    }

    #[tokio::test]
    async fn test_queue_waiting_reaches_all_agents() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(Arc::clone(&store), registry);

        let support = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let client = Uuid::new_v4();
        store.add_user(support, UserRole::Support, AgentStatus::Away).await;
        store.add_user(admin, UserRole::Admin, AgentStatus::Available).await;
        store.add_user(client, UserRole::Client, AgentStatus::Available).await;

        notifier.queue_waiting(Uuid::new_v4()).await;

        assert_eq!(store.list_notifications(support).await.unwrap().len(), 1);
        assert_eq!(store.list_notifications(admin).await.unwrap().len(), 1);
        assert!(store.list_notifications(client).await.unwrap().is_empty());
    }
}
