//! End-to-end engine flows over the in-memory store
//!
//! Exercises the full resolve -> assign -> persist -> publish -> notify
//! pipeline the way the HTTP layer drives it, with channel fakes standing
//! in for sockets.

#![allow(clippy::unwrap_used)]

use chatline_core::{
    AssignmentOutcome, ChatStore, Connection, ConnectionRegistry, MemoryStore, MessageDraft,
    MessageRelay, PresenceTracker, ServerEvent,
};
use chatline_shared::{AgentStatus, ChatStatus, CoreError, NotificationKind, UserRole};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

fn build_relay(
    store: &Arc<MemoryStore>,
) -> (MessageRelay<MemoryStore>, Arc<ConnectionRegistry>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let presence = PresenceTracker::new(Arc::clone(store), Arc::clone(&registry), false);
    let relay = MessageRelay::new(Arc::clone(store), Arc::clone(&registry), presence);
    (relay, registry)
}

async fn connect_user(
    registry: &ConnectionRegistry,
    user_id: Uuid,
) -> UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.add_connection(Connection::new(user_id, tx)).await;
    rx
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn client_text(sender_id: Uuid, text: &str) -> MessageDraft {
    MessageDraft {
        sender_id,
        sender_role: UserRole::Client,
        body: Some(text.to_string()),
        attachment: None,
        chat_id: None,
    }
}

fn agent_text(sender_id: Uuid, text: &str, chat_id: Option<Uuid>) -> MessageDraft {
    MessageDraft {
        sender_id,
        sender_role: UserRole::Support,
        body: Some(text.to_string()),
        attachment: None,
        chat_id,
    }
}

#[tokio::test]
async fn first_message_with_free_agent_goes_active() {
    let store = Arc::new(MemoryStore::new());
    let agent = Uuid::new_v4();
    let client = Uuid::new_v4();
    store
        .add_user(agent, UserRole::Support, AgentStatus::Available)
        .await;

    let (relay, registry) = build_relay(&store);
    let mut agent_rx = connect_user(&registry, agent).await;

    let delivery = relay
        .relay(client_text(client, "hi, I need help"))
        .await
        .unwrap();

    assert_eq!(delivery.outcome, AssignmentOutcome::Assigned { agent_id: agent });
    assert_eq!(delivery.chat.status, ChatStatus::Active);
    assert_eq!(delivery.chat.agent_id, Some(agent));
    assert!(delivery.chat.started_at.is_some());

    let profile = store.get_user(agent).await.unwrap().unwrap();
    assert_eq!(profile.status, AgentStatus::Busy);

    // Durable side effect: the agent holds a chat_assigned notification
    let notifications = store.list_notifications(agent).await.unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotificationKind::ChatAssigned && n.chat_id == Some(delivery.chat.id)));

    // Realtime side effect: the agent's personal channel saw the assignment
    let events = drain(&mut agent_rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::ChatAssigned { agent_id, .. } if *agent_id == agent)));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::NewNotification { .. })));
}

#[tokio::test]
async fn first_message_with_no_agent_stays_queued() {
    let store = Arc::new(MemoryStore::new());
    let support = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let client = Uuid::new_v4();
    // Both agents exist but neither is available
    store.add_user(support, UserRole::Support, AgentStatus::Away).await;
    store.add_user(admin, UserRole::Admin, AgentStatus::Busy).await;

    let (relay, registry) = build_relay(&store);
    let operator = Uuid::new_v4();
    let mut operator_rx = connect_user(&registry, operator).await;

    let delivery = relay.relay(client_text(client, "anyone there?")).await.unwrap();

    // The message is never lost: stored, chat queued at position 1
    assert_eq!(delivery.outcome, AssignmentOutcome::Queued { position: 1 });
    assert_eq!(delivery.chat.status, ChatStatus::Queued);
    assert!(delivery.chat.agent_id.is_none());
    assert_eq!(store.list_messages(delivery.chat.id).await.unwrap().len(), 1);

    // Every agent and admin hears about the new queue entry
    for recipient in [support, admin] {
        let notifications = store.list_notifications(recipient).await.unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::QueueNew));
    }

    // Operator dashboards get the queue snapshot and fresh stats
    let events = drain(&mut operator_rx);
    assert!(events.iter().any(
        |e| matches!(e, ServerEvent::QueueUpdate { queued } if queued.len() == 1 && queued[0].position == 1)
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::StatsUpdate { stats } if stats.queued == 1)));
}

#[tokio::test]
async fn presence_releases_after_last_active_chat() {
    let store = Arc::new(MemoryStore::new());
    let agent = Uuid::new_v4();
    let client_a = Uuid::new_v4();
    let client_b = Uuid::new_v4();
    store
        .add_user(agent, UserRole::Support, AgentStatus::Available)
        .await;

    let (relay, _registry) = build_relay(&store);

    // First chat auto-assigns; the second is routed manually onto the
    // now-busy agent (deliberate override).
    let first = relay.relay(client_text(client_a, "hello")).await.unwrap();
    let second = relay.relay(client_text(client_b, "hello too")).await.unwrap();
    assert_eq!(second.outcome, AssignmentOutcome::Queued { position: 1 });
    relay.assign_manual(second.chat.id, agent).await.unwrap();

    // Ending one of two active chats keeps the agent busy
    relay.end_chat(first.chat.id).await.unwrap();
    let profile = store.get_user(agent).await.unwrap().unwrap();
    assert_eq!(profile.status, AgentStatus::Busy);

    // Ending the last one releases them
    relay.end_chat(second.chat.id).await.unwrap();
    let profile = store.get_user(agent).await.unwrap().unwrap();
    assert_eq!(profile.status, AgentStatus::Available);
}

#[tokio::test]
async fn client_reuses_open_chat() {
    let store = Arc::new(MemoryStore::new());
    let client = Uuid::new_v4();

    let (relay, _registry) = build_relay(&store);

    let first = relay.relay(client_text(client, "first")).await.unwrap();
    let second = relay.relay(client_text(client, "second")).await.unwrap();

    assert_eq!(first.chat.id, second.chat.id);
    assert_eq!(second.outcome, AssignmentOutcome::Existing);

    let messages = store.list_messages(first.chat.id).await.unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn message_order_is_stable_across_reads() {
    let store = Arc::new(MemoryStore::new());
    let client = Uuid::new_v4();

    let (relay, _registry) = build_relay(&store);
    for text in ["one", "two", "three", "four"] {
        relay.relay(client_text(client, text)).await.unwrap();
    }

    let chat = store.find_open_chat_for_client(client).await.unwrap().unwrap();
    let first_read = store.list_messages(chat.id).await.unwrap();
    let second_read = store.list_messages(chat.id).await.unwrap();

    let ids_a: Vec<Uuid> = first_read.iter().map(|m| m.id).collect();
    let ids_b: Vec<Uuid> = second_read.iter().map(|m| m.id).collect();
    assert_eq!(ids_a, ids_b);

    let bodies: Vec<&str> = first_read.iter().filter_map(|m| m.body.as_deref()).collect();
    assert_eq!(bodies, vec!["one", "two", "three", "four"]);
}

#[tokio::test]
async fn agent_pull_takes_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let agent = Uuid::new_v4();
    store
        .add_user(agent, UserRole::Support, AgentStatus::Away)
        .await;

    let (relay, _registry) = build_relay(&store);

    let c1 = relay.relay(client_text(Uuid::new_v4(), "early")).await.unwrap();
    let c2 = relay.relay(client_text(Uuid::new_v4(), "late")).await.unwrap();

    let first_pull = relay
        .relay(agent_text(agent, "hello, how can I help?", None))
        .await
        .unwrap();
    assert_eq!(first_pull.chat.id, c1.chat.id);
    assert_eq!(first_pull.chat.agent_id, Some(agent));

    let second_pull = relay.relay(agent_text(agent, "next up", None)).await.unwrap();
    assert_eq!(second_pull.chat.id, c2.chat.id);

    let err = relay
        .relay(agent_text(agent, "anyone else?", None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EmptyQueue));
}

#[tokio::test]
async fn concurrent_pulls_never_double_claim() {
    let store = Arc::new(MemoryStore::new());
    let (relay, _registry) = build_relay(&store);

    relay.relay(client_text(Uuid::new_v4(), "only one of me")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let agent = Uuid::new_v4();
        store
            .add_user(agent, UserRole::Support, AgentStatus::Available)
            .await;
        let relay = relay.clone();
        handles.push(tokio::spawn(async move { relay.claim_next(agent).await }));
    }

    let mut wins = 0;
    let mut empties = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(CoreError::EmptyQueue) => empties += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(empties, 3);
}

#[tokio::test]
async fn first_responder_claims_by_replying() {
    let store = Arc::new(MemoryStore::new());
    let responder = Uuid::new_v4();
    let latecomer = Uuid::new_v4();
    for agent in [responder, latecomer] {
        store.add_user(agent, UserRole::Support, AgentStatus::Away).await;
    }

    let (relay, _registry) = build_relay(&store);
    let queued = relay.relay(client_text(Uuid::new_v4(), "waiting")).await.unwrap();
    assert_eq!(queued.chat.status, ChatStatus::Queued);

    let reply = relay
        .relay(agent_text(responder, "I got this", Some(queued.chat.id)))
        .await
        .unwrap();
    assert_eq!(
        reply.outcome,
        AssignmentOutcome::Assigned { agent_id: responder }
    );
    assert_eq!(reply.chat.agent_id, Some(responder));

    // A later reply from someone else is just a message, not a re-claim
    let late = relay
        .relay(agent_text(latecomer, "me too", Some(queued.chat.id)))
        .await
        .unwrap();
    assert_eq!(late.outcome, AssignmentOutcome::Existing);
    assert_eq!(late.chat.agent_id, Some(responder));
}

#[tokio::test]
async fn rejects_empty_message_and_unknown_chat() {
    let store = Arc::new(MemoryStore::new());
    let (relay, _registry) = build_relay(&store);

    let err = relay
        .relay(MessageDraft {
            sender_id: Uuid::new_v4(),
            sender_role: UserRole::Client,
            body: Some("   ".to_string()),
            attachment: None,
            chat_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = relay
        .relay(agent_text(Uuid::new_v4(), "hello?", Some(Uuid::new_v4())))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ChatNotFound));
}

#[tokio::test]
async fn client_cannot_write_into_foreign_chat() {
    let store = Arc::new(MemoryStore::new());
    let (relay, _registry) = build_relay(&store);

    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let delivery = relay.relay(client_text(owner, "mine")).await.unwrap();

    let mut draft = client_text(intruder, "not mine");
    draft.chat_id = Some(delivery.chat.id);
    let err = relay.relay(draft).await.unwrap_err();
    assert!(matches!(err, CoreError::ChatNotFound));
}

#[tokio::test]
async fn ending_is_terminal_and_distinct() {
    let store = Arc::new(MemoryStore::new());
    let (relay, _registry) = build_relay(&store);

    let delivery = relay.relay(client_text(Uuid::new_v4(), "short chat")).await.unwrap();
    let ended = relay.end_chat(delivery.chat.id).await.unwrap();
    assert_eq!(ended.status, ChatStatus::Ended);
    assert!(ended.ended_at.is_some());

    let err = relay.end_chat(delivery.chat.id).await.unwrap_err();
    assert!(matches!(err, CoreError::ChatEnded));

    let err = relay.end_chat(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CoreError::ChatNotFound));
}

#[tokio::test]
async fn queue_positions_rebroadcast_after_claim() {
    let store = Arc::new(MemoryStore::new());
    let (relay, registry) = build_relay(&store);

    let c1 = relay.relay(client_text(Uuid::new_v4(), "a")).await.unwrap();
    let c2 = relay.relay(client_text(Uuid::new_v4(), "b")).await.unwrap();
    let c3 = relay.relay(client_text(Uuid::new_v4(), "c")).await.unwrap();

    let operator = Uuid::new_v4();
    let mut operator_rx = connect_user(&registry, operator).await;

    let agent = Uuid::new_v4();
    store
        .add_user(agent, UserRole::Support, AgentStatus::Available)
        .await;
    let claimed = relay.claim_next(agent).await.unwrap();
    assert_eq!(claimed.id, c1.chat.id);

    // The snapshot after the claim shows the two survivors, renumbered
    let events = drain(&mut operator_rx);
    let last_queue = events
        .iter()
        .rev()
        .find_map(|e| match e {
            ServerEvent::QueueUpdate { queued } => Some(queued.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_queue.len(), 2);
    assert_eq!(last_queue[0].chat_id, c2.chat.id);
    assert_eq!(last_queue[0].position, 1);
    assert_eq!(last_queue[1].chat_id, c3.chat.id);
    assert_eq!(last_queue[1].position, 2);
}

#[tokio::test]
async fn queued_chat_end_has_no_presence_effect() {
    let store = Arc::new(MemoryStore::new());
    let (relay, _registry) = build_relay(&store);

    let delivery = relay.relay(client_text(Uuid::new_v4(), "never answered")).await.unwrap();
    assert_eq!(delivery.chat.status, ChatStatus::Queued);

    // Ended while still queued: allowed, no agent involved
    let ended = relay.end_chat(delivery.chat.id).await.unwrap();
    assert_eq!(ended.status, ChatStatus::Ended);
    assert!(ended.agent_id.is_none());
}
