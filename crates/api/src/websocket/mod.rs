//! WebSocket endpoint
//!
//! Upgrades authenticated connections and bridges them into the engine's
//! connection registry. The registry owns channel membership; this module
//! only moves frames.

pub mod handler;

pub use handler::ws_handler;
