// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface of the query tier.
//!
//! Pagination parameters are parsed leniently the way the envelope
//! tolerates unknown fields: an unparseable or out-of-range `limit` or
//! `offset` falls back to its default rather than failing the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use super::QueryPlanner;
use crate::response::ApiResponse;
use crate::metrics;

pub fn router(planner: Arc<QueryPlanner>) -> Router {
    Router::new()
        .route("/api/posts", get(recent_posts))
        .route("/api/posts/:post_id", get(post_detail))
        .route("/api/users/:user_id/posts", get(user_posts))
        .route("/api/users/:user_id/stats", get(user_stats))
        .route("/health", get(health))
        .with_state(planner)
}

fn param_i64(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.parse().ok())
}

async fn recent_posts(
    State(planner): State<Arc<QueryPlanner>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let posts = planner.recent_posts(param_i64(&params, "limit")).await;

    let count = posts.len();
    let body = ApiResponse::ok(format!("Retrieved {} recent posts", count), posts)
        .with_count(count);
    metrics::record_request_latency("/api/posts", started.elapsed());
    (StatusCode::OK, Json(body)).into_response()
}

async fn post_detail(
    State(planner): State<Arc<QueryPlanner>>,
    Path(post_id): Path<String>,
) -> Response {
    let started = Instant::now();
    let response = match post_id.parse::<Uuid>() {
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("post_id must be a valid id")),
        )
            .into_response(),
        Ok(post_id) => match planner.post_detail(post_id).await {
            Some(detail) => (
                StatusCode::OK,
                Json(ApiResponse::ok("Post retrieved successfully", detail)),
            )
                .into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Post not found")),
            )
                .into_response(),
        },
    };
    metrics::record_request_latency("/api/posts/{post_id}", started.elapsed());
    response
}

async fn user_posts(
    State(planner): State<Arc<QueryPlanner>>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let result = planner
        .user_posts(
            &user_id,
            param_i64(&params, "limit"),
            param_i64(&params, "offset"),
        )
        .await;

    let response = match result {
        Ok(posts) => {
            let count = posts.len();
            let body =
                ApiResponse::ok(format!("Retrieved {} posts for user {}", count, user_id), posts)
                    .with_count(count);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to query user posts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to retrieve posts")),
            )
                .into_response()
        }
    };
    metrics::record_request_latency("/api/users/{user_id}/posts", started.elapsed());
    response
}

async fn user_stats(
    State(planner): State<Arc<QueryPlanner>>,
    Path(user_id): Path<String>,
) -> Response {
    let started = Instant::now();
    let response = match planner.user_stats(&user_id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(ApiResponse::ok("User statistics retrieved successfully", stats)),
        )
            .into_response(),
        Err(e) => {
            error!(user_id, error = %e, "Failed to query user stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to retrieve user statistics")),
            )
                .into_response()
        }
    };
    metrics::record_request_latency("/api/users/{user_id}/stats", started.elapsed());
    response
}

/// Fleet health: `healthy` only when every shard answers its ping.
async fn health(State(planner): State<Arc<QueryPlanner>>) -> Response {
    let (healthy, total) = planner.ping_shards().await;

    let degraded = healthy < total;
    let body = json!({
        "service": "query",
        "status": if degraded { "degraded" } else { "healthy" },
        "healthy_shards": healthy,
        "total_shards": total,
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    let status = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body)).into_response()
}
