//! Presence tracking
//!
//! Keeps each agent's availability flag in sync with the chats they hold.
//! Status changes also arrive from outside (an agent toggling themselves
//! away); all writes are single unconditional updates, so concurrent
//! external changes cannot wedge the tracker.

use chatline_shared::{AgentStatus, Chat, CoreError, CoreResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::realtime::{Audience, ConnectionRegistry, ServerEvent};
use crate::store::ChatStore;

pub struct PresenceTracker<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
    /// When enabled, an agent who set themselves `away` is flipped back to
    /// `available` once their last active chat ends. Off by default: manual
    /// `away` is sticky.
    auto_revert_away: bool,
}

impl<S> Clone for PresenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            auto_revert_away: self.auto_revert_away,
        }
    }
}

impl<S: ChatStore> PresenceTracker<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>, auto_revert_away: bool) -> Self {
        Self {
            store,
            registry,
            auto_revert_away,
        }
    }

    /// An agent gained a chat: mark them busy. Idempotent if already busy.
    pub async fn on_assigned(&self, agent_id: Uuid) -> CoreResult<()> {
        self.store
            .set_agent_status(agent_id, AgentStatus::Busy)
            .await?;

        self.registry
            .publish(
                ServerEvent::UserStatusChanged {
                    user_id: agent_id,
                    status: AgentStatus::Busy,
                },
                Audience::Broadcast,
            )
            .await;

        Ok(())
    }

    /// A chat ended: release the agent if it was their last active chat.
    ///
    /// A chat that ended while still queued has no agent and no presence
    /// effect.
    pub async fn on_chat_ended(&self, chat: &Chat) -> CoreResult<()> {
        let Some(agent_id) = chat.agent_id else {
            return Ok(());
        };

        let remaining = self.store.count_active_chats_for_agent(agent_id).await?;
        if remaining > 0 {
            tracing::debug!(
                agent_id = %agent_id,
                remaining_active = remaining,
                "agent still holds active chats, staying busy"
            );
            return Ok(());
        }

        let Some(agent) = self.store.get_user(agent_id).await? else {
            return Ok(());
        };

        let release = match agent.status {
            AgentStatus::Busy => true,
            AgentStatus::Away => self.auto_revert_away,
            AgentStatus::Available => false,
        };
        if !release {
            return Ok(());
        }

        self.store
            .set_agent_status(agent_id, AgentStatus::Available)
            .await?;

        self.registry
            .publish(
                ServerEvent::UserStatusChanged {
                    user_id: agent_id,
                    status: AgentStatus::Available,
                },
                Audience::Broadcast,
            )
            .await;

        tracing::info!(agent_id = %agent_id, "agent released back to available");
        Ok(())
    }

    /// External status change (agent toggling their own availability)
    pub async fn set_status(&self, agent_id: Uuid, status: AgentStatus) -> CoreResult<()> {
        let agent = self
            .store
            .get_user(agent_id)
            .await?
            .ok_or(CoreError::UserNotFound)?;
        if !agent.role.is_agent() {
            return Err(CoreError::Validation(
                "only support or admin users carry an availability status".into(),
            ));
        }

        self.store.set_agent_status(agent_id, status).await?;

        self.registry
            .publish(
                ServerEvent::UserStatusChanged {
                    user_id: agent_id,
                    status,
                },
                Audience::Broadcast,
            )
            .await;

        tracing::info!(agent_id = %agent_id, status = %status.as_str(), "agent status changed");
        Ok(())
    }
}
