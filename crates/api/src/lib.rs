//! Chatline API Library
//!
//! This crate contains the HTTP/WebSocket server components for Chatline.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
