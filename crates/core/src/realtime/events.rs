//! Realtime event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use chatline_shared::{AgentStatus, ChatMessage, ChatStatus, Notification, QueueStats};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a chat's participant channel
    JoinChat { chat_id: Uuid },

    /// Leave a chat's participant channel
    LeaveChat { chat_id: Uuid },

    /// Start typing in a chat
    TypingStart { chat_id: Uuid },

    /// Stop typing in a chat
    TypingStop { chat_id: Uuid },

    /// Agent changes their own availability
    SetStatus { status: AgentStatus },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New message added to a chat
    NewMessage { chat_id: Uuid, message: ChatMessage },

    /// A chat gained an agent
    ChatAssigned { chat_id: Uuid, agent_id: Uuid },

    /// A chat's lifecycle state changed
    ChatStatusUpdate { chat_id: Uuid, status: ChatStatus },

    /// Queue membership changed; full snapshot for operator dashboards
    QueueUpdate { queued: Vec<QueueEntry> },

    /// A waiting chat's position moved
    QueuePositionUpdate { chat_id: Uuid, position: i64 },

    /// Agent availability changed
    UserStatusChanged { user_id: Uuid, status: AgentStatus },

    /// User started typing in a chat
    UserTyping { chat_id: Uuid, user_id: Uuid },

    /// User stopped typing in a chat
    UserStopTyping { chat_id: Uuid, user_id: Uuid },

    /// A durable notification was created for this user
    NewNotification { notification: Notification },

    /// Queue/load counters changed
    StatsUpdate { stats: QueueStats },

    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

/// One waiting chat as shown on the queue dashboard
#[derive(Debug, Serialize, Clone)]
pub struct QueueEntry {
    pub chat_id: Uuid,
    pub client_id: Uuid,
    pub position: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"join_chat","chat_id":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinChat { chat_id } => {
                assert_eq!(
                    chat_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
            }
            _ => panic!("Expected JoinChat event"),
        }
    }

    #[test]
    fn test_set_status_deserialization() {
        let json = r#"{"type":"set_status","status":"away"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            ClientEvent::SetStatus {
                status: AgentStatus::Away
            }
        ));
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Pong;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_position_event_serialization() {
        let chat_id = Uuid::new_v4();
        let event = ServerEvent::QueuePositionUpdate {
            chat_id,
            position: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("queue_position_update"));
        assert!(json.contains("\"position\":3"));
    }
}
