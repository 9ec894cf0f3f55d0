//! WebSocket push channels.
//!
//! Provides the connection registry owned by the notifier, per-connection
//! heartbeat tracking, and the HTTP upgrade handler used by Axum routes.

mod handler;
pub mod heartbeat;
pub mod registry;

pub use handler::ws_handler;
pub use heartbeat::{Heartbeat, HeartbeatConfig, PING_TEXT};
pub use registry::{ConnectionRegistry, LiveChannel, SendOutcome};
