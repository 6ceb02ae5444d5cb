//! Router configuration for the API.

use axum::{Router, middleware};
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::doc::ApiDoc;
use crate::api::handlers;
use crate::api::middleware::{cron_secret_middleware, logging_middleware, request_id_middleware};
use crate::state::AppState;

/// Creates the application router.
///
/// # Routes
/// - `POST /trigger/{task}` - guarded by `x-cron-secret`
/// - `GET /health`, `GET /health/ready` - open
/// - `/swagger-ui` - API documentation
///
/// Middleware is applied in reverse order of declaration, so the request id
/// is assigned before the logging span is opened.
pub fn create_router(state: AppState) -> Router {
    let trigger_routes = handlers::trigger::trigger_routes().layer(
        middleware::from_fn_with_state(state.clone(), cron_secret_middleware),
    );

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(handlers::health::health_routes())
        .merge(trigger_routes)
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::{CRON_SECRET_HEADER, REQUEST_ID_HEADER};
    use crate::config::Settings;
    use crate::jobs::{JobStatus, JobType, NewJob};
    use crate::store::{MemoryStore, Stores};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value as JsonValue, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret-0123456789";

    fn app() -> (Router, AppState) {
        let mut settings = Settings::default();
        settings.trigger.secret = SECRET.to_string();
        let state = AppState::new(&settings, Stores::memory(MemoryStore::new())).unwrap();
        (create_router(state.clone()), state)
    }

    fn trigger(task: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/trigger/{task}"));
        if let Some(secret) = secret {
            builder = builder.header(CRON_SECRET_HEADER, secret);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_trigger_requires_secret() {
        let (router, _) = app();

        let response = router
            .clone()
            .oneshot(trigger("cold-email-send", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "UNAUTHORIZED");

        let response = router
            .oneshot(trigger("cold-email-send", Some("wrong-secret-0123456")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trigger_rejects_unknown_task() {
        let (router, _) = app();
        let response = router
            .oneshot(trigger("sms-send", Some(SECRET)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("sms-send"));
    }

    #[tokio::test]
    async fn test_trigger_with_empty_queue_succeeds() {
        let (router, _) = app();
        let response = router
            .oneshot(trigger("newsletter-send", Some(SECRET)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["task"], "newsletter-send");
        assert_eq!(body["lockAcquired"], true);
        assert!(body["startedAt"].is_string());
        assert!(body["completedAt"].is_string());
        assert!(body.get("jobId").is_none());
    }

    #[tokio::test]
    async fn test_trigger_reports_failed_job_as_500() {
        let (router, state) = app();
        let job = state
            .runner
            .queue()
            .enqueue(NewJob::new(
                JobType::ColdEmailSend,
                Uuid::new_v4(),
                json!({ "campaign_id": Uuid::new_v4() }),
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(trigger("cold-email-send", Some(SECRET)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["task"], "cold-email-send");
        assert!(body["error"].as_str().unwrap().contains("Campaign"));
        assert!(body["startedAt"].is_string());
        assert_eq!(
            state.runner.queue().get(job.id).await.unwrap().status,
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_health_endpoints_are_open() {
        let (router, _) = app();

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());

        let response = router
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }
}
