//! Realtime fan-out
//!
//! Multicasts engine events to three addressable audiences: a user's
//! personal channel, a chat's participant channel, and a global broadcast
//! to every connected socket. Delivery is best-effort, at-most-once per
//! connected socket, with no replay: a socket that connects after an event
//! fired never receives it, and callers re-fetch state on (re)connect.
//!
//! # Architecture
//!
//! - **Connection**: one authenticated socket with its outbound channel
//! - **ConnectionRegistry**: owns live connections and chat-channel
//!   membership; injected wherever events are published
//! - **Events**: type-safe client/server event definitions

pub mod connection;
pub mod events;
pub mod registry;

pub use connection::Connection;
pub use events::{ClientEvent, QueueEntry, ServerEvent};
pub use registry::{Audience, ConnectionRegistry};
