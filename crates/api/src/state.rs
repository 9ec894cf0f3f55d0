use std::sync::Arc;

use imgq_core::queue::JobQueue;
use imgq_core::store::ResultStore;

use crate::config::ServerConfig;
use crate::notifications::NotifierHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Where submitted jobs go.
    pub queue: Arc<dyn JobQueue>,
    /// Where workers leave results; read by the pull endpoint.
    pub results: Arc<dyn ResultStore>,
    /// Owner of the watch set and the live push channels.
    pub notifier: NotifierHandle,
}
