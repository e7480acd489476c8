// ABOUTME: Chat HTTP handlers: start a turn, resume its stream, delete a chat
// ABOUTME: Validation and quota run before any side effect; responses are SSE or JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use crate::auth::authenticate;
use crate::errors::{AppError, AppResult};
use crate::models::{GeoHints, IncomingMessage, Visibility};
use crate::orchestrator::{TurnPhase, TurnRequest};
use crate::relay::{EventStream, StreamEvent};
use crate::resources::ServerResources;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Request body of `POST /api/chat`
///
/// Field names mirror the client protocol, hence the explicit renames.
#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    id: String,
    message: IncomingMessage,
    #[serde(rename = "selectedChatModel")]
    selected_chat_model: Option<String>,
    #[serde(rename = "selectedVisibilityType")]
    selected_visibility_type: Option<Visibility>,
}

/// Start a chat turn and stream its events
///
/// The body is taken as raw JSON and parsed by hand so a malformed body is a
/// 400, before authentication and before any side effect.
pub async fn post_chat(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    match run_post_chat(&resources, &headers, body).await {
        Ok(stream) => sse_response(stream),
        Err(e) => e.into_response(),
    }
}

async fn run_post_chat(
    resources: &ServerResources,
    headers: &HeaderMap,
    body: Option<Json<Value>>,
) -> AppResult<EventStream> {
    let Some(Json(body)) = body else {
        return Err(AppError::invalid_input("Request body must be JSON"));
    };
    let body: ChatRequestBody = serde_json::from_value(body)
        .map_err(|e| AppError::invalid_input(format!("Invalid request body: {e}")))?;
    if body.id.is_empty() || body.message.id.is_empty() {
        return Err(AppError::invalid_input("Chat id and message id are required"));
    }

    let user = authenticate(&resources.store, headers).await?;

    resources.quota.check(&user.user_id, user.tier).await?;
    debug!(
        phase = TurnPhase::QuotaChecked.as_str(),
        chat_id = %body.id,
        user_id = %user.user_id,
        "Turn"
    );

    let request = TurnRequest {
        chat_id: body.id,
        message: body.message,
        model: body
            .selected_chat_model
            .unwrap_or_else(|| resources.config.default_chat_model.clone()),
        visibility: body.selected_visibility_type.unwrap_or(Visibility::Private),
        hints: geo_hints(headers),
    };

    let turn = resources
        .orchestrator
        .prepare_turn(&user.user_id, request)
        .await?;
    Ok(resources.relay.open(&turn.stream_id, turn.producer).await)
}

/// Resume the most recent stream of an owned chat
pub async fn resume_chat_stream(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Response {
    match run_resume(&resources, &headers, &chat_id).await {
        Ok(stream) => sse_response(stream),
        Err(e) => e.into_response(),
    }
}

async fn run_resume(
    resources: &ServerResources,
    headers: &HeaderMap,
    chat_id: &str,
) -> AppResult<EventStream> {
    let user = authenticate(&resources.store, headers).await?;

    let chat = resources
        .store
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Chat {chat_id}")))?;
    if chat.user_id != user.user_id {
        return Err(AppError::forbidden("Chat belongs to another user"));
    }

    let handle = resources
        .store
        .latest_stream_id(chat_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Stream for chat {chat_id}")))?;

    resources.relay.resume(&handle.id).await
}

/// Query of `DELETE /api/chat`
#[derive(Debug, Deserialize)]
pub struct DeleteChatParams {
    id: String,
}

/// Delete an owned chat and return the deleted record
pub async fn delete_chat(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(params): Query<DeleteChatParams>,
) -> Response {
    match run_delete(&resources, &headers, &params.id).await {
        Ok(chat) => Json(chat).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_delete(
    resources: &ServerResources,
    headers: &HeaderMap,
    chat_id: &str,
) -> AppResult<crate::database::ChatRecord> {
    let user = authenticate(&resources.store, headers).await?;

    let chat = resources
        .store
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Chat {chat_id}")))?;
    if chat.user_id != user.user_id {
        return Err(AppError::forbidden("Chat belongs to another user"));
    }

    resources
        .store
        .delete_chat(chat_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Chat {chat_id}")))
}

/// Coarse geolocation hints forwarded by the edge proxy
fn geo_hints(headers: &HeaderMap) -> GeoHints {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    let number = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    };

    GeoHints {
        city: text("x-geo-city"),
        country: text("x-geo-country"),
        latitude: number("x-geo-latitude"),
        longitude: number("x-geo-longitude"),
    }
}

/// Wrap a relay event stream as an SSE response
fn sse_response(stream: EventStream) -> Response {
    let events = stream.map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn sse_event(event: &StreamEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            // Serialization of our own event type failing is a bug; surface
            // a generic in-band error rather than dropping the connection.
            warn!(error = %e, "Failed to encode stream event");
            Event::default().data(r#"{"type":"error","message":"encoding failure"}"#)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_hints_parse_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-geo-city", "Lyon".parse().unwrap());
        headers.insert("x-geo-latitude", "45.76".parse().unwrap());

        let hints = geo_hints(&headers);
        assert_eq!(hints.city.as_deref(), Some("Lyon"));
        assert_eq!(hints.latitude, Some(45.76));
        assert!(hints.country.is_none());
    }

    #[test]
    fn body_field_renames_match_client_protocol() {
        let body: ChatRequestBody = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "message": { "id": "m1", "role": "user", "parts": [{ "type": "text", "text": "hi" }] },
            "selectedChatModel": "chat-model",
            "selectedVisibilityType": "private"
        }))
        .unwrap();

        assert_eq!(body.selected_chat_model.as_deref(), Some("chat-model"));
        assert_eq!(body.selected_visibility_type, Some(Visibility::Private));
    }
}
