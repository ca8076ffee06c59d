// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface of the ingestion tier.
//!
//! Writes return `202 Accepted` with the assigned id: acceptance means
//! the event is durable on the log, not that it is visible to reads yet.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::{IngestError, IngestService};
use crate::metrics;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub action: String,
}

/// Build the ingestion router. CORS/trace layers are the binary's
/// concern.
pub fn router(service: Arc<IngestService>) -> Router {
    Router::new()
        .route("/api/posts", post(create_post))
        .route("/api/comments", post(create_comment))
        .route("/api/likes", post(like))
        .route("/health", get(health))
        .with_state(service)
}

async fn create_post(
    State(service): State<Arc<IngestService>>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let response = match payload {
        Err(_) => bad_request("invalid request body"),
        Ok(Json(req)) => match service.create_post(&req.user_id, &req.content).await {
            Ok(id) => accepted("Post accepted for processing", json!({ "post_id": id })),
            Err(e) => ingest_error(e),
        },
    };
    metrics::record_request_latency("/api/posts", started.elapsed());
    response
}

async fn create_comment(
    State(service): State<Arc<IngestService>>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let response = match payload {
        Err(_) => bad_request("invalid request body"),
        Ok(Json(req)) => match service
            .create_comment(&req.post_id, &req.user_id, &req.content)
            .await
        {
            Ok(id) => accepted("Comment accepted for processing", json!({ "comment_id": id })),
            Err(e) => ingest_error(e),
        },
    };
    metrics::record_request_latency("/api/comments", started.elapsed());
    response
}

async fn like(
    State(service): State<Arc<IngestService>>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let response = match payload {
        Err(_) => bad_request("invalid request body"),
        Ok(Json(req)) => match service.like(&req.post_id, &req.user_id, &req.action).await {
            Ok(id) => {
                let message = if req.action == "like" {
                    "Like accepted for processing"
                } else {
                    "Unlike accepted for processing"
                };
                accepted(message, json!({ "like_id": id }))
            }
            Err(e) => ingest_error(e),
        },
    };
    metrics::record_request_latency("/api/likes", started.elapsed());
    response
}

/// The producer is stateless, so health is unconditional.
async fn health() -> Response {
    let body = ApiResponse::ok(
        "Ingestion service is healthy",
        json!({
            "service": "ingestion",
            "timestamp": Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );
    (StatusCode::OK, Json(body)).into_response()
}

fn accepted(message: &str, data: serde_json::Value) -> Response {
    (StatusCode::ACCEPTED, Json(ApiResponse::ok(message, data))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message))).into_response()
}

fn ingest_error(err: IngestError) -> Response {
    match err {
        IngestError::Validation(message) => bad_request(&message),
        IngestError::Publish(e) => {
            error!(error = %e, "Rejecting write: publish failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to process request")),
            )
                .into_response()
        }
    }
}
