//! Health surface of the consumer tier.
//!
//! Readiness means the first partition assignment has completed; before
//! that the process reports 503 so orchestration holds traffic and
//! restarts a consumer that never joins its group.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use super::ConsumerStatus;
use crate::response::ApiResponse;

pub fn router(status: Arc<ConsumerStatus>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(status)
}

async fn health(State(status): State<Arc<ConsumerStatus>>) -> Response {
    let state = status.state();
    let body = json!({
        "service": "consumer",
        "state": state.to_string(),
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    if status.is_ready() {
        (
            StatusCode::OK,
            Json(ApiResponse::ok("Consumer is ready", body)),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("awaiting first partition assignment")),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unready_consumer_is_503() {
        let status = Arc::new(ConsumerStatus::new());
        let app = router(status);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_assigned_consumer_is_200() {
        let status = Arc::new(ConsumerStatus::new());
        status.mark_assigned();
        let app = router(status);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
