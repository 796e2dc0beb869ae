//! Assignment engine
//!
//! Selects the least-loaded available agent for a waiting chat. The claim
//! itself is a single conditional store write: of any number of concurrent
//! attempts on one chat, exactly one observes `true` and may publish; the
//! rest must stand down.

use chatline_shared::{CoreError, CoreResult};
use std::sync::Arc;
use uuid::Uuid;

use crate::presence::PresenceTracker;
use crate::store::ChatStore;

pub struct AssignmentEngine<S> {
    store: Arc<S>,
    presence: PresenceTracker<S>,
}

impl<S> Clone for AssignmentEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            presence: self.presence.clone(),
        }
    }
}

impl<S: ChatStore> AssignmentEngine<S> {
    pub fn new(store: Arc<S>, presence: PresenceTracker<S>) -> Self {
        Self { store, presence }
    }

    /// Assign the best available agent to an unclaimed chat.
    ///
    /// Selection: fewest active chats first, ties broken by ascending agent
    /// id, so repeated runs over the same state pick the same agent.
    ///
    /// Errors: `NoAgentAvailable` when the candidate pool is empty (the chat
    /// stays queued, untouched); `AlreadyAssigned` when a concurrent attempt
    /// claimed the chat first.
    pub async fn assign(&self, chat_id: Uuid) -> CoreResult<Uuid> {
        let candidates = self.store.find_available_agents_by_load().await?;
        let Some(agent_id) = candidates.into_iter().next() else {
            tracing::debug!(chat_id = %chat_id, "no available agent for chat");
            return Err(CoreError::NoAgentAvailable);
        };

        if !self.store.claim_chat(chat_id, agent_id).await? {
            tracing::debug!(chat_id = %chat_id, "lost claim race, chat already assigned");
            return Err(CoreError::AlreadyAssigned);
        }

        self.presence.on_assigned(agent_id).await?;
        tracing::info!(chat_id = %chat_id, agent_id = %agent_id, "chat assigned");
        Ok(agent_id)
    }

    /// Assign a specific agent, bypassing candidate selection.
    ///
    /// Validates the target's role but deliberately not their availability:
    /// a manual override may hand a chat to a busy agent.
    pub async fn assign_to(&self, chat_id: Uuid, agent_id: Uuid) -> CoreResult<Uuid> {
        let agent = self
            .store
            .get_user(agent_id)
            .await?
            .ok_or(CoreError::UserNotFound)?;
        if !agent.role.is_agent() {
            return Err(CoreError::Validation(
                "chats can only be assigned to support or admin users".into(),
            ));
        }

        if !self.store.claim_chat(chat_id, agent_id).await? {
            return Err(CoreError::AlreadyAssigned);
        }

        self.presence.on_assigned(agent_id).await?;
        tracing::info!(chat_id = %chat_id, agent_id = %agent_id, "chat manually assigned");
        Ok(agent_id)
    }
}
