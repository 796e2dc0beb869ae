//! Common types used across Chatline

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Queued,
    Active,
    Ended,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Queued => "queued",
            ChatStatus::Active => "active",
            ChatStatus::Ended => "ended",
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ChatStatus::Queued),
            "active" => Ok(ChatStatus::Active),
            "ended" => Ok(ChatStatus::Ended),
            other => Err(format!("unknown chat status: {other}")),
        }
    }
}

/// Role of a platform user
///
/// Clients open chats; support and admin users ("agents") answer them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Support,
    Admin,
}

impl UserRole {
    /// Whether this role is eligible to be assigned chats
    pub fn is_agent(&self) -> bool {
        matches!(self, UserRole::Support | UserRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Support => "support",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(UserRole::Client),
            "support" => Ok(UserRole::Support),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

/// Agent availability flag
///
/// Only `Available` agents are eligible for new assignments. Manual `Away`
/// is sticky and is not auto-reverted by the presence tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Away,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Away => "away",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(AgentStatus::Available),
            "busy" => Ok(AgentStatus::Busy),
            "away" => Ok(AgentStatus::Away),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Durable notification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    ChatAssigned,
    QueueNew,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewMessage => "new_message",
            NotificationKind::ChatAssigned => "chat_assigned",
            NotificationKind::QueueNew => "queue_new",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_message" => Ok(NotificationKind::NewMessage),
            "chat_assigned" => Ok(NotificationKind::ChatAssigned),
            "queue_new" => Ok(NotificationKind::QueueNew),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A support conversation between a client and (eventually) an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub client_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub status: ChatStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Attachment descriptor stored alongside a message
///
/// The raw bytes live in external storage; only the durable descriptor is
/// persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub kind: String,
    pub name: String,
    pub size: i64,
}

/// A single message within a chat
///
/// `seq` is the store-assigned insertion order, used as the tie-break when
/// two messages share a `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Agent-facing view of a user row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: Uuid,
    pub role: UserRole,
    pub status: AgentStatus,
}

/// Durable notification record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub body: String,
    pub chat_id: Option<Uuid>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Point-in-time counters pushed to operator dashboards
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: i64,
    pub active: i64,
    pub available_agents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [ChatStatus::Queued, ChatStatus::Active, ChatStatus::Ended] {
            assert_eq!(status.as_str().parse::<ChatStatus>(), Ok(status));
        }
        assert!("open".parse::<ChatStatus>().is_err());
    }

    #[test]
    fn test_agent_roles() {
        assert!(!UserRole::Client.is_agent());
        assert!(UserRole::Support.is_agent());
        assert!(UserRole::Admin.is_agent());
    }

    #[test]
    fn test_enum_serde_shape() {
        let json = serde_json::to_string(&AgentStatus::Available).unwrap();
        assert_eq!(json, r#""available""#);
        let kind: NotificationKind = serde_json::from_str(r#""queue_new""#).unwrap();
        assert_eq!(kind, NotificationKind::QueueNew);
    }
}
