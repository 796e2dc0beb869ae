//! Connection registry
//!
//! Owns every live connection and all chat-channel membership. Injected
//! into the engine components that publish events, so fan-out can be tested
//! with plain channel fakes instead of sockets.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Where an event is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every socket of one user (all their devices/tabs)
    User(Uuid),
    /// Every socket that joined a chat's channel
    Chat(Uuid),
    /// Every connected socket
    Broadcast,
}

/// Registry of live connections and chat-channel membership
#[derive(Default)]
pub struct ConnectionRegistry {
    /// All active connections indexed by session_id
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,

    /// Map of chat_id -> connections joined to that chat's channel
    channels: RwLock<HashMap<Uuid, Vec<Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            total_connections = connections.len(),
            "realtime connection added"
        );

        conn
    }

    /// Remove a connection and drop it from every chat channel
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(session_id) {
            let mut channels = self.channels.write().await;
            for conns in channels.values_mut() {
                conns.retain(|c| c.session_id != *session_id);
            }
            channels.retain(|_, conns| !conns.is_empty());

            tracing::info!(
                session_id = %session_id,
                user_id = %conn.user_id,
                remaining_connections = connections.len(),
                "realtime connection removed"
            );
        }
    }

    /// Add a connection to a chat's channel
    pub async fn join_chat(&self, chat_id: Uuid, conn: Arc<Connection>) {
        let mut channels = self.channels.write().await;
        let conns = channels.entry(chat_id).or_default();
        if !conns.iter().any(|c| c.session_id == conn.session_id) {
            conns.push(Arc::clone(&conn));
        }

        tracing::debug!(
            chat_id = %chat_id,
            session_id = %conn.session_id,
            channel_size = conns.len(),
            "connection joined chat channel"
        );
    }

    /// Remove a connection from a chat's channel
    pub async fn leave_chat(&self, chat_id: &Uuid, session_id: &Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(conns) = channels.get_mut(chat_id) {
            conns.retain(|c| c.session_id != *session_id);
            if conns.is_empty() {
                channels.remove(chat_id);
            }
        }
    }

    /// Deliver an event to an audience
    ///
    /// Best-effort: send errors (closed connections awaiting cleanup) are
    /// counted and logged, never surfaced.
    pub async fn publish(&self, event: ServerEvent, audience: Audience) {
        let targets: Vec<Arc<Connection>> = match audience {
            Audience::User(user_id) => {
                let connections = self.connections.read().await;
                connections
                    .values()
                    .filter(|c| c.user_id == user_id)
                    .cloned()
                    .collect()
            }
            Audience::Chat(chat_id) => {
                let channels = self.channels.read().await;
                channels.get(&chat_id).cloned().unwrap_or_default()
            }
            Audience::Broadcast => {
                let connections = self.connections.read().await;
                connections.values().cloned().collect()
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        for conn in &targets {
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed += 1,
            }
        }

        if failed > 0 {
            tracing::warn!(
                audience = ?audience,
                event = ?event,
                delivered,
                failed,
                "some realtime deliveries failed (connections likely closed)"
            );
        } else {
            tracing::debug!(audience = ?audience, delivered, "published realtime event");
        }
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Number of sockets joined to a chat's channel
    pub async fn channel_size(&self, chat_id: &Uuid) -> usize {
        let channels = self.channels.read().await;
        channels.get(chat_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connect(user_id: Uuid) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(user_id, tx), rx)
    }

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = connect(Uuid::new_v4());
        let session_id = conn.session_id;

        registry.add_connection(conn).await;
        assert_eq!(registry.connection_count().await, 1);

        registry.remove_connection(&session_id).await;
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_user_audience_reaches_all_devices() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (conn1, mut rx1) = connect(user_id);
        let (conn2, mut rx2) = connect(user_id);
        let (other, mut rx3) = connect(Uuid::new_v4());

        registry.add_connection(conn1).await;
        registry.add_connection(conn2).await;
        registry.add_connection(other).await;

        registry
            .publish(ServerEvent::Pong, Audience::User(user_id))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_audience_requires_join() {
        let registry = ConnectionRegistry::new();
        let chat_id = Uuid::new_v4();

        let (conn1, mut rx1) = connect(Uuid::new_v4());
        let (conn2, mut rx2) = connect(Uuid::new_v4());

        let conn1 = registry.add_connection(conn1).await;
        registry.add_connection(conn2).await;
        registry.join_chat(chat_id, Arc::clone(&conn1)).await;

        registry
            .publish(ServerEvent::Pong, Audience::Chat(chat_id))
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (conn1, mut rx1) = connect(Uuid::new_v4());
        let (conn2, mut rx2) = connect(Uuid::new_v4());

        registry.add_connection(conn1).await;
        registry.add_connection(conn2).await;

        registry.publish(ServerEvent::Pong, Audience::Broadcast).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_remove_connection_leaves_channels() {
        let registry = ConnectionRegistry::new();
        let chat1 = Uuid::new_v4();
        let chat2 = Uuid::new_v4();

        let (conn, _rx) = connect(Uuid::new_v4());
        let conn = registry.add_connection(conn).await;
        registry.join_chat(chat1, Arc::clone(&conn)).await;
        registry.join_chat(chat2, Arc::clone(&conn)).await;

        assert_eq!(registry.channel_size(&chat1).await, 1);

        registry.remove_connection(&conn.session_id).await;
        assert_eq!(registry.channel_size(&chat1).await, 0);
        assert_eq!(registry.channel_size(&chat2).await, 0);
    }

    #[tokio::test]
    async fn test_no_delivery_to_late_joiner() {
        let registry = ConnectionRegistry::new();
        let chat_id = Uuid::new_v4();

        registry
            .publish(ServerEvent::Pong, Audience::Chat(chat_id))
            .await;

        // Socket joining after the event fired never receives it
        let (conn, mut rx) = connect(Uuid::new_v4());
        let conn = registry.add_connection(conn).await;
        registry.join_chat(chat_id, conn).await;

        assert!(rx.try_recv().is_err());
    }
}
