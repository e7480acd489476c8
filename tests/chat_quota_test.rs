// ABOUTME: Integration tests for the rate and quota ceilings on the chat endpoint
// ABOUTME: A rejected request must leave no trace: no provider call, no writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use common::{
    chat_request_body, create_test_harness, create_test_harness_with, create_test_session,
    test_config, ScriptedProvider, StubFetcher,
};
use helpers::axum_test::AxumTestRequest;
use rill_server::database::NewMessage;
use rill_server::models::{MessagePart, MessageRole, UserTier, Visibility};
use serde_json::Value;
use std::sync::Arc;

/// Seed `count` user messages for `user_id` in a dedicated chat
async fn seed_user_messages(store: &rill_server::database::ChatStore, user_id: &str, count: usize) {
    store
        .create_chat("seed-chat", user_id, "seed", Visibility::Private)
        .await
        .unwrap();
    let messages: Vec<NewMessage> = (0..count)
        .map(|i| NewMessage {
            id: format!("seed-{i}"),
            chat_id: "seed-chat".to_owned(),
            role: MessageRole::User,
            parts: vec![MessagePart::text("hi")],
        })
        .collect();
    store.save_messages(&messages).await.unwrap();
}

#[tokio::test]
async fn guest_over_message_ceiling_gets_429_with_no_side_effects() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Guest).await;
    seed_user_messages(harness.store(), "u1", 20).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c-new", "m1", "one more"))
        .send(harness.router.clone())
        .await;

    assert_eq!(response.status(), 429);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");

    // Nothing happened: no provider call, no chat, no message, no usage row
    assert_eq!(harness.provider.total_calls(), 0);
    assert!(harness.store().get_chat("c-new").await.unwrap().is_none());
    assert_eq!(
        harness
            .store()
            .count_user_messages_since("u1", 24)
            .await
            .unwrap(),
        20
    );
    assert!(harness.store().get_usage_rows("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn regular_tier_passes_where_guest_is_capped() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;
    seed_user_messages(harness.store(), "u1", 20).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c-new", "m1", "still fine"))
        .send(harness.router.clone())
        .await;

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn daily_request_ceiling_returns_plain_message_body() {
    let mut config = test_config();
    config.daily_request_ceiling = 2;
    let harness = create_test_harness_with(
        ScriptedProvider::unscripted(),
        Arc::new(StubFetcher::default()),
        config,
    )
    .await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    for _ in 0..2 {
        harness
            .store()
            .save_usage("u1", "chat-model", "chat", 1, 1, 2)
            .await
            .unwrap();
    }

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c1", "m1", "hello"))
        .send(harness.router.clone())
        .await;

    assert_eq!(response.status(), 429);
    // Secondary ceiling uses the bare `{ message }` shape, not the envelope
    let body: Value = response.json();
    assert!(body["message"].is_string());
    assert!(body.get("error").is_none());
    assert_eq!(harness.provider.total_calls(), 0);
}

#[tokio::test]
async fn ceilings_are_per_user() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u2", UserTier::Guest).await;
    seed_user_messages(harness.store(), "u1", 20).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c-new", "m1", "different user"))
        .send(harness.router.clone())
        .await;

    assert_eq!(response.status(), 200);
}
