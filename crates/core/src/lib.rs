//! Chatline Routing & Realtime Messaging Engine
//!
//! The engine routes inbound support conversations from clients to human
//! agents, tracks each chat through its lifecycle, and relays messages and
//! presence events to connected clients in real time.
//!
//! # Architecture
//!
//! - **store**: the record-store seam (`ChatStore`) with the Postgres and
//!   in-memory implementations; the store is the source of truth.
//! - **assign**: load-balanced agent selection with a conditional claim write.
//! - **queue**: FIFO queue order and position recomputation.
//! - **relay**: the orchestrating pipeline (resolve -> assign -> persist ->
//!   publish -> notify).
//! - **presence**: agent availability as a side effect of assignment/ending.
//! - **realtime**: the connection registry and event catalogue.
//! - **notify**: best-effort durable notification side effects.

pub mod assign;
pub mod notify;
pub mod presence;
pub mod queue;
pub mod realtime;
pub mod relay;
pub mod store;

pub use assign::AssignmentEngine;
pub use notify::Notifier;
pub use presence::PresenceTracker;
pub use queue::QueueManager;
pub use realtime::{Audience, ClientEvent, Connection, ConnectionRegistry, QueueEntry, ServerEvent};
pub use relay::{AssignmentOutcome, Delivery, MessageDraft, MessageRelay};
pub use store::{ChatStore, MemoryStore, NewMessage, PgChatStore};
