// ABOUTME: Integration tests for resuming chat turn streams over SSE
// ABOUTME: Resumed clients must see the identical gap-free event sequence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use common::{
    assert_stream_complete, chat_request_body, create_test_harness, create_test_harness_with,
    create_test_session, sse_events, test_config, ScriptedProvider, StubFetcher,
};
use helpers::axum_test::AxumTestRequest;
use rill_server::config::RelayMode;
use rill_server::models::UserTier;
use serde_json::Value;
use std::sync::Arc;

#[tokio::test]
async fn two_resumed_clients_see_identical_sequences() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c1", "m1", "Hello"))
        .send(harness.router.clone())
        .await;
    assert_eq!(response.status(), 200);
    let original = sse_events(&response.text());
    assert_stream_complete(&original);

    let mut replays: Vec<Vec<Value>> = Vec::new();
    for _ in 0..2 {
        let resume = AxumTestRequest::get("/api/chat/c1/stream")
            .header("authorization", &auth)
            .send(harness.router.clone())
            .await;
        assert_eq!(resume.status(), 200);
        let events = sse_events(&resume.text());
        assert_stream_complete(&events);
        replays.push(events);
    }

    assert_eq!(replays[0], replays[1]);
    assert_eq!(replays[0], original);
}

#[tokio::test]
async fn resume_replays_the_latest_stream_of_the_chat() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    for message_id in ["m1", "m2"] {
        let response = AxumTestRequest::post("/api/chat")
            .header("authorization", &auth)
            .json(&chat_request_body("c1", message_id, "again"))
            .send(harness.router.clone())
            .await;
        assert_eq!(response.status(), 200);
        response.text();
    }

    let resume = AxumTestRequest::get("/api/chat/c1/stream")
        .header("authorization", &auth)
        .send(harness.router.clone())
        .await;
    assert_eq!(resume.status(), 200);

    // One turn's worth of events, not both turns concatenated
    let events = sse_events(&resume.text());
    assert_stream_complete(&events);
    assert_eq!(
        events
            .iter()
            .filter(|e| e["type"] == "finish")
            .count(),
        1
    );
}

#[tokio::test]
async fn resume_of_unknown_chat_is_404() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    let response = AxumTestRequest::get("/api/chat/nope/stream")
        .header("authorization", &auth)
        .send(harness.router.clone())
        .await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn resume_of_another_users_chat_is_403() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let owner = create_test_session(harness.store(), "tok-a", "u1", UserTier::Regular).await;
    let intruder = create_test_session(harness.store(), "tok-b", "u2", UserTier::Regular).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &owner)
        .json(&chat_request_body("c1", "m1", "private"))
        .send(harness.router.clone())
        .await;
    assert_eq!(response.status(), 200);
    response.text();

    let resume = AxumTestRequest::get("/api/chat/c1/stream")
        .header("authorization", &intruder)
        .send(harness.router.clone())
        .await;
    assert_eq!(resume.status(), 403);
}

#[tokio::test]
async fn direct_relay_cannot_resume() {
    let mut config = test_config();
    config.relay_mode = RelayMode::Direct;
    let harness = create_test_harness_with(
        ScriptedProvider::unscripted(),
        Arc::new(StubFetcher::default()),
        config,
    )
    .await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c1", "m1", "Hello"))
        .send(harness.router.clone())
        .await;
    assert_eq!(response.status(), 200);
    assert_stream_complete(&sse_events(&response.text()));

    let resume = AxumTestRequest::get("/api/chat/c1/stream")
        .header("authorization", &auth)
        .send(harness.router.clone())
        .await;
    assert_eq!(resume.status(), 404);
}
