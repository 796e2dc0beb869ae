//! Waiting queue
//!
//! Queue order is always re-derived from the store (pure FIFO on
//! `created_at`); nothing is cached here. Whenever queue membership may
//! have changed, positions are recomputed and re-broadcast to every chat
//! still waiting.

use chatline_shared::{Chat, ChatStatus, CoreError, CoreResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::realtime::{Audience, ConnectionRegistry, QueueEntry, ServerEvent};
use crate::store::ChatStore;

/// Upper bound on one queue scan. Far above any realistic waiting-room
/// depth; keeps a runaway queue from unbounded fan-out.
const QUEUE_SCAN_LIMIT: i64 = 500;

pub struct QueueManager<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
}

impl<S> Clone for QueueManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: ChatStore> QueueManager<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Unassigned queued chats, oldest first
    pub async fn current_queue(&self) -> CoreResult<Vec<Chat>> {
        self.store.list_queued(QUEUE_SCAN_LIMIT).await
    }

    /// 1-based position of a waiting chat
    pub async fn position(&self, chat_id: Uuid) -> CoreResult<i64> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or(CoreError::ChatNotFound)?;
        if chat.status != ChatStatus::Queued || chat.agent_id.is_some() {
            return Err(CoreError::Validation("chat is not waiting in queue".into()));
        }
        self.store.queued_position(&chat).await
    }

    /// Current queue with positions attached
    pub async fn entries(&self) -> CoreResult<Vec<QueueEntry>> {
        let queued = self.current_queue().await?;
        Ok(entries_with_positions(&queued))
    }

    /// Recompute every waiting chat's position and push the results out:
    /// a `queue_update` snapshot to all operators, plus a
    /// `queue_position_update` into each waiting chat's channel.
    ///
    /// Invoked after every assignment attempt (successful or not) and after
    /// every ended chat, since either can change the denominator under a
    /// waiting chat's position.
    pub async fn broadcast_positions(&self) -> CoreResult<()> {
        let entries = self.entries().await?;

        self.registry
            .publish(
                ServerEvent::QueueUpdate {
                    queued: entries.clone(),
                },
                Audience::Broadcast,
            )
            .await;

        for entry in entries {
            self.registry
                .publish(
                    ServerEvent::QueuePositionUpdate {
                        chat_id: entry.chat_id,
                        position: entry.position,
                    },
                    Audience::Chat(entry.chat_id),
                )
                .await;
        }

        Ok(())
    }
}

/// Positions over an already-ordered queue snapshot. A chat's position is
/// the count of waiting chats created at or before it, so equal timestamps
/// share a position.
fn entries_with_positions(queued: &[Chat]) -> Vec<QueueEntry> {
    queued
        .iter()
        .map(|chat| QueueEntry {
            chat_id: chat.id,
            client_id: chat.client_id,
            position: queued
                .iter()
                .filter(|other| other.created_at <= chat.created_at)
                .count() as i64,
            created_at: chat.created_at,
        })
        .collect()
}
