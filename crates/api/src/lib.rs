//! HTTP and WebSocket façade for the image generation queue.
//!
//! Submissions are validated, bound to a fresh client id, watched by the
//! [`notifications::Notifier`], and enqueued. Results are available by pull
//! (`GET /result/{client_id}`) and pushed over `WS /ws/{client_id}`.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
