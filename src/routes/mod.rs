// ABOUTME: Router assembly: chat endpoints, health probe, and tower middleware
// ABOUTME: All handlers share ServerResources as axum state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

mod chat;

use crate::resources::ServerResources;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Maximum accepted request body (message parts are references, not uploads)
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Build the application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route(
            "/api/chat",
            axum::routing::post(chat::post_chat).delete(chat::delete_chat),
        )
        .route("/api/chat/:id/stream", get(chat::resume_chat_stream))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(resources)
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
