//! Handlers for submitting generation jobs and pulling their results.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use imgq_core::generation::{validate_generate_request, GenerateRequest};
use imgq_core::types::{ClientId, JobId};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Acknowledgement text returned on submit.
pub const QUEUED_MESSAGE: &str = "Image generation job queued.";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub message: &'static str,
}

/// Pull-path view of a result. Expired and never-written look the same.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultStatus {
    /// `result` is the stored payload verbatim: serialized JSON on
    /// success, plain failure text otherwise.
    Done { result: String },
    Pending,
}

/// POST /generate/
///
/// Validates the request, mints a client id, watches it, and enqueues the
/// job. The id is watched before the job exists so a fast worker cannot
/// finish unobserved.
pub async fn submit_generation(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<SubmitResponse>> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    validate_generate_request(&input)?;

    let client_id = ClientId::generate();
    let job = input.into_job(client_id.clone());

    state.notifier.watch(client_id.clone());
    let job_id = match state.queue.enqueue(job, &state.config.retry_policy()).await {
        Ok(job_id) => job_id,
        Err(e) => {
            state.notifier.unwatch(client_id);
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job_id, client_id = %client_id, "Job queued");

    Ok(Json(SubmitResponse {
        job_id,
        client_id,
        message: QUEUED_MESSAGE,
    }))
}

/// GET /result/{client_id}
pub async fn get_result(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<Json<ResultStatus>> {
    let client_id = ClientId::from(client_id);
    let status = match state.results.get(&client_id).await? {
        Some(result) => ResultStatus::Done { result },
        None => ResultStatus::Pending,
    };
    Ok(Json(status))
}
