use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;
use crate::ws;

/// Job submission, result pull, and the push channel.
///
/// ```text
/// POST  /generate              -> submit_generation
/// POST  /generate/             -> submit_generation
/// GET   /result/{client_id}    -> get_result
/// GET   /ws/{client_id}        -> ws_handler (WebSocket upgrade)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::submit_generation))
        .route("/generate/", post(generation::submit_generation))
        .route("/result/{client_id}", get(generation::get_result))
        .route("/ws/{client_id}", get(ws::ws_handler))
}
