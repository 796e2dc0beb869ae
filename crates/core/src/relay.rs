//! Message relay
//!
//! The orchestrating pipeline: resolve (or create) the target chat, run
//! assignment when the chat needs an agent, persist the message, then fan
//! out realtime events and notification side effects. Everything after the
//! message write is post-commit and best-effort.

use chatline_shared::{
    Attachment, Chat, ChatMessage, ChatStatus, CoreError, CoreResult, UserRole,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::assign::AssignmentEngine;
use crate::notify::Notifier;
use crate::presence::PresenceTracker;
use crate::queue::QueueManager;
use crate::realtime::{Audience, ConnectionRegistry, ServerEvent};
use crate::store::{ChatStore, NewMessage};

/// How many waiting chats one pull attempt will walk past while losing
/// claim races to other agents.
const PULL_SCAN_LIMIT: i64 = 50;

/// Inbound message before chat resolution
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub chat_id: Option<Uuid>,
}

/// What happened to the chat's assignment while delivering a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// The chat gained an agent during this delivery
    Assigned { agent_id: Uuid },
    /// No agent was free; the chat waits at this queue position
    Queued { position: i64 },
    /// The chat was already resolved; nothing changed
    Existing,
}

/// Result of a relayed message
#[derive(Debug, Clone)]
pub struct Delivery {
    pub chat: Chat,
    pub message: ChatMessage,
    pub outcome: AssignmentOutcome,
}

pub struct MessageRelay<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
    assigner: AssignmentEngine<S>,
    queue: QueueManager<S>,
    presence: PresenceTracker<S>,
    notifier: Notifier<S>,
}

impl<S> Clone for MessageRelay<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            assigner: self.assigner.clone(),
            queue: self.queue.clone(),
            presence: self.presence.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: ChatStore> MessageRelay<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<ConnectionRegistry>,
        presence: PresenceTracker<S>,
    ) -> Self {
        let assigner = AssignmentEngine::new(Arc::clone(&store), presence.clone());
        let queue = QueueManager::new(Arc::clone(&store), Arc::clone(&registry));
        let notifier = Notifier::new(Arc::clone(&store), Arc::clone(&registry));
        Self {
            store,
            registry,
            assigner,
            queue,
            presence,
            notifier,
        }
    }

    pub fn queue(&self) -> &QueueManager<S> {
        &self.queue
    }

    pub fn presence(&self) -> &PresenceTracker<S> {
        &self.presence
    }

    /// Deliver one inbound message: resolve the chat, persist, publish.
    pub async fn relay(&self, draft: MessageDraft) -> CoreResult<Delivery> {
        let has_body = draft
            .body
            .as_deref()
            .map(|b| !b.trim().is_empty())
            .unwrap_or(false);
        if !has_body && draft.attachment.is_none() {
            return Err(CoreError::Validation(
                "message must include text or an attachment".into(),
            ));
        }

        let (chat, outcome) = self.resolve_chat(&draft).await?;

        let message = self
            .store
            .insert_message(&NewMessage {
                chat_id: chat.id,
                sender_id: draft.sender_id,
                sender_role: draft.sender_role,
                body: draft.body.clone(),
                attachment: draft.attachment.clone(),
            })
            .await?;

        tracing::info!(
            chat_id = %chat.id,
            message_id = %message.id,
            sender_id = %draft.sender_id,
            sender_role = %draft.sender_role.as_str(),
            outcome = ?outcome,
            "message relayed"
        );

        self.publish_delivery(&chat, &message, &outcome, draft.sender_role)
            .await;

        Ok(Delivery {
            chat,
            message,
            outcome,
        })
    }

    /// Agent pulls the oldest waiting chat without sending a message.
    pub async fn claim_next(&self, agent_id: Uuid) -> CoreResult<Chat> {
        let chat_id = self.pull_oldest(agent_id).await?;
        let chat = self.refreshed(chat_id).await?;
        self.announce_assignment(chat_id, agent_id).await;
        Ok(chat)
    }

    /// Run the assignment engine against a waiting chat.
    ///
    /// Surfaces `NoAgentAvailable` untouched; the chat stays queued.
    pub async fn assign_chat(&self, chat_id: Uuid) -> CoreResult<Chat> {
        if self.store.get_chat(chat_id).await?.is_none() {
            return Err(CoreError::ChatNotFound);
        }

        let agent_id = self.assigner.assign(chat_id).await?;
        let chat = self.refreshed(chat_id).await?;
        self.announce_assignment(chat_id, agent_id).await;
        Ok(chat)
    }

    /// Manually route a chat to a specific agent (dispatcher override).
    pub async fn assign_manual(&self, chat_id: Uuid, agent_id: Uuid) -> CoreResult<Chat> {
        // Distinguish a missing chat from a lost claim up front
        if self.store.get_chat(chat_id).await?.is_none() {
            return Err(CoreError::ChatNotFound);
        }

        self.assigner.assign_to(chat_id, agent_id).await?;
        let chat = self.refreshed(chat_id).await?;
        self.announce_assignment(chat_id, agent_id).await;
        Ok(chat)
    }

    /// Terminal transition of a chat, with presence release and rebroadcast.
    pub async fn end_chat(&self, chat_id: Uuid) -> CoreResult<Chat> {
        match self.store.end_chat(chat_id).await? {
            Some(chat) => {
                self.presence.on_chat_ended(&chat).await?;

                self.registry
                    .publish(
                        ServerEvent::ChatStatusUpdate {
                            chat_id: chat.id,
                            status: chat.status,
                        },
                        Audience::Chat(chat.id),
                    )
                    .await;
                self.after_queue_change(chat.id).await;

                tracing::info!(chat_id = %chat.id, agent_id = ?chat.agent_id, "chat ended");
                Ok(chat)
            }
            None => match self.store.get_chat(chat_id).await? {
                Some(_) => Err(CoreError::ChatEnded),
                None => Err(CoreError::ChatNotFound),
            },
        }
    }

    // =========================================================================
    // Chat resolution
    // =========================================================================

    async fn resolve_chat(&self, draft: &MessageDraft) -> CoreResult<(Chat, AssignmentOutcome)> {
        if let Some(chat_id) = draft.chat_id {
            let chat = self
                .store
                .get_chat(chat_id)
                .await?
                .ok_or(CoreError::ChatNotFound)?;

            // A client can only write into their own chat; don't reveal
            // whether someone else's chat id exists.
            if draft.sender_role == UserRole::Client && chat.client_id != draft.sender_id {
                return Err(CoreError::ChatNotFound);
            }

            // First responder: an agent replying into an unclaimed chat
            // takes it as a side effect.
            if draft.sender_role.is_agent()
                && chat.status == ChatStatus::Queued
                && chat.agent_id.is_none()
            {
                if self.store.claim_chat(chat.id, draft.sender_id).await? {
                    self.presence.on_assigned(draft.sender_id).await?;
                    let chat = self.refreshed(chat.id).await?;
                    return Ok((
                        chat,
                        AssignmentOutcome::Assigned {
                            agent_id: draft.sender_id,
                        },
                    ));
                }
                // Lost the race to another responder; deliver as a plain reply
                let chat = self.refreshed(chat.id).await?;
                return Ok((chat, AssignmentOutcome::Existing));
            }

            return Ok((chat, AssignmentOutcome::Existing));
        }

        if draft.sender_role == UserRole::Client {
            // One open chat per client: reuse before creating
            if let Some(chat) = self
                .store
                .find_open_chat_for_client(draft.sender_id)
                .await?
            {
                return Ok((chat, AssignmentOutcome::Existing));
            }

            let chat = self.store.create_chat(draft.sender_id).await?;
            match self.assigner.assign(chat.id).await {
                Ok(agent_id) => {
                    let chat = self.refreshed(chat.id).await?;
                    Ok((chat, AssignmentOutcome::Assigned { agent_id }))
                }
                Err(CoreError::NoAgentAvailable) => {
                    let position = self.store.queued_position(&chat).await?;
                    Ok((chat, AssignmentOutcome::Queued { position }))
                }
                Err(CoreError::AlreadyAssigned) => {
                    // An agent pulled the brand-new chat before we could
                    // auto-assign it; deliver into it as-is.
                    let chat = self.refreshed(chat.id).await?;
                    Ok((chat, AssignmentOutcome::Existing))
                }
                Err(other) => Err(other),
            }
        } else {
            // Agent with no chat id: pull from the front of the queue
            let chat_id = self.pull_oldest(draft.sender_id).await?;
            let chat = self.refreshed(chat_id).await?;
            Ok((
                chat,
                AssignmentOutcome::Assigned {
                    agent_id: draft.sender_id,
                },
            ))
        }
    }

    /// Claim the oldest waiting chat, skipping entries lost to concurrent
    /// pulls. `EmptyQueue` when nothing (left) is waiting.
    async fn pull_oldest(&self, agent_id: Uuid) -> CoreResult<Uuid> {
        for candidate in self.store.list_queued(PULL_SCAN_LIMIT).await? {
            if self.store.claim_chat(candidate.id, agent_id).await? {
                self.presence.on_assigned(agent_id).await?;
                tracing::info!(
                    chat_id = %candidate.id,
                    agent_id = %agent_id,
                    "agent pulled chat from queue"
                );
                return Ok(candidate.id);
            }
        }
        Err(CoreError::EmptyQueue)
    }

    async fn refreshed(&self, chat_id: Uuid) -> CoreResult<Chat> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or(CoreError::ChatNotFound)
    }

    // =========================================================================
    // Post-commit fan-out
    // =========================================================================

    /// Assignment fan-out shared by the claim/assign paths: the chat channel
    /// and the agent's personal channel hear about it, the agent gets a
    /// durable notification, and queue positions are renumbered.
    async fn announce_assignment(&self, chat_id: Uuid, agent_id: Uuid) {
        self.registry
            .publish(
                ServerEvent::ChatAssigned { chat_id, agent_id },
                Audience::Chat(chat_id),
            )
            .await;
        self.registry
            .publish(
                ServerEvent::ChatAssigned { chat_id, agent_id },
                Audience::User(agent_id),
            )
            .await;
        self.notifier.chat_assigned(agent_id, chat_id).await;
        self.after_queue_change(chat_id).await;
    }

    async fn publish_delivery(
        &self,
        chat: &Chat,
        message: &ChatMessage,
        outcome: &AssignmentOutcome,
        sender_role: UserRole,
    ) {
        self.registry
            .publish(
                ServerEvent::NewMessage {
                    chat_id: chat.id,
                    message: message.clone(),
                },
                Audience::Chat(chat.id),
            )
            .await;

        // Any assignment attempt shifts the arithmetic under waiting chats,
        // so both non-Existing outcomes end in a queue rebroadcast.
        match outcome {
            AssignmentOutcome::Assigned { agent_id } => {
                self.announce_assignment(chat.id, *agent_id).await;
            }
            AssignmentOutcome::Queued { position } => {
                self.registry
                    .publish(
                        ServerEvent::QueuePositionUpdate {
                            chat_id: chat.id,
                            position: *position,
                        },
                        Audience::Chat(chat.id),
                    )
                    .await;
                self.notifier.queue_waiting(chat.id).await;
                self.after_queue_change(chat.id).await;
            }
            AssignmentOutcome::Existing => {}
        }

        // Clients notify the chat's agent; agents never notify themselves
        if sender_role == UserRole::Client {
            if let Some(agent_id) = chat.agent_id {
                self.notifier.client_message(agent_id, chat.id).await;
            }
        }
    }

    async fn after_queue_change(&self, chat_id: Uuid) {
        if let Err(error) = self.queue.broadcast_positions().await {
            tracing::warn!(
                chat_id = %chat_id,
                error = %error,
                "failed to rebroadcast queue positions"
            );
        }

        match self.store.queue_stats().await {
            Ok(stats) => {
                self.registry
                    .publish(ServerEvent::StatsUpdate { stats }, Audience::Broadcast)
                    .await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to compute queue stats");
            }
        }
    }
}
