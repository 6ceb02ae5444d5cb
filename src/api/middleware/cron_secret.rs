//! Shared-secret guard for the trigger routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the scheduler's shared secret.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Rejects requests whose `x-cron-secret` header is missing or wrong with 401.
pub async fn cron_secret_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(CRON_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized {
            message: format!("Missing {CRON_SECRET_HEADER} header"),
        })?;

    if state.trigger_secret.is_empty()
        || !constant_time_eq(provided.as_bytes(), state.trigger_secret.as_bytes())
    {
        tracing::warn!(path = %request.uri().path(), "Rejected trigger call with invalid secret");
        return Err(AppError::Unauthorized {
            message: "Invalid cron secret".to_string(),
        });
    }

    Ok(next.run(request).await)
}

// Time depends only on the lengths, not on where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
