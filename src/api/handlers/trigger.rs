//! Scheduler entry point: `POST /trigger/{task}`.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jiff::Timestamp;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::TRIGGER_TAG;
use crate::api::dto::{ErrorResponse, TriggerErrorResponse, TriggerResponse};
use crate::error::AppResult;
use crate::jobs::JobType;
use crate::state::AppState;

/// Trigger routes; the cron secret guard is layered on by the router.
pub fn trigger_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(trigger_task))
}

/// Run one tick of a task under its distributed lock
///
/// A lost lock race is a success with `lockAcquired: false`. Processor and
/// store failures are reported as 500 with the task and timing.
#[utoipa::path(
    post,
    path = "/trigger/{task}",
    params(
        ("task" = String, Path, description = "Task name", example = "cold-email-send")
    ),
    responses(
        (status = 200, description = "Task ran or was skipped", body = TriggerResponse),
        (status = 400, description = "Unknown task", body = ErrorResponse),
        (status = 401, description = "Missing or invalid x-cron-secret", body = ErrorResponse),
        (status = 500, description = "Task failed", body = TriggerErrorResponse)
    ),
    security(("cronSecret" = [])),
    tag = TRIGGER_TAG
)]
async fn trigger_task(State(state): State<AppState>, Path(task): Path<String>) -> AppResult<Response> {
    let task: JobType = task.parse()?;
    let started_at = Timestamp::now();

    let response = match state.runner.run(task).await {
        Ok(run) => Json(TriggerResponse {
            success: true,
            task,
            started_at,
            completed_at: Timestamp::now(),
            lock_acquired: run.lock_acquired,
            job_id: run.job.as_ref().map(|j| j.id),
            job_status: run.job.as_ref().map(|j| j.status),
        })
        .into_response(),
        Err(error) => {
            tracing::error!(%task, error = %error, "Triggered task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerErrorResponse {
                    error: error.to_string(),
                    task,
                    started_at,
                    completed_at: Timestamp::now(),
                }),
            )
                .into_response()
        }
    };

    Ok(response)
}
