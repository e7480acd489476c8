// ABOUTME: Integration tests for chat deletion over the HTTP surface
// ABOUTME: Only the owner may delete; the deleted record is echoed back
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use common::{chat_request_body, create_test_harness, create_test_session, ScriptedProvider};
use helpers::axum_test::AxumTestRequest;
use rill_server::models::UserTier;
use serde_json::Value;

#[tokio::test]
async fn owner_deletes_chat_and_its_messages() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &auth)
        .json(&chat_request_body("c1", "m1", "soon gone"))
        .send(harness.router.clone())
        .await;
    assert_eq!(response.status(), 200);
    response.text();

    let delete = AxumTestRequest::delete("/api/chat?id=c1")
        .header("authorization", &auth)
        .send(harness.router.clone())
        .await;
    assert_eq!(delete.status(), 200);
    let body: Value = delete.json();
    assert_eq!(body["id"], "c1");
    assert_eq!(body["user_id"], "u1");

    assert!(harness.store().get_chat("c1").await.unwrap().is_none());
    assert!(harness.store().get_messages("c1").await.unwrap().is_empty());
    assert!(harness.store().latest_stream_id("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn non_owner_delete_is_forbidden_and_changes_nothing() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let owner = create_test_session(harness.store(), "tok-a", "u1", UserTier::Regular).await;
    let intruder = create_test_session(harness.store(), "tok-b", "u2", UserTier::Regular).await;

    let response = AxumTestRequest::post("/api/chat")
        .header("authorization", &owner)
        .json(&chat_request_body("c1", "m1", "keep out"))
        .send(harness.router.clone())
        .await;
    assert_eq!(response.status(), 200);
    response.text();

    let delete = AxumTestRequest::delete("/api/chat?id=c1")
        .header("authorization", &intruder)
        .send(harness.router.clone())
        .await;
    assert_eq!(delete.status(), 403);
    let body: Value = delete.json();
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    let chat = harness.store().get_chat("c1").await.unwrap().unwrap();
    assert_eq!(chat.user_id, "u1");
    assert_eq!(harness.store().get_messages("c1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn deleting_a_missing_chat_is_404() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;
    let auth = create_test_session(harness.store(), "tok", "u1", UserTier::Regular).await;

    let delete = AxumTestRequest::delete("/api/chat?id=nope")
        .header("authorization", &auth)
        .send(harness.router.clone())
        .await;
    assert_eq!(delete.status(), 404);
}

#[tokio::test]
async fn unauthenticated_delete_is_401() {
    let harness = create_test_harness(ScriptedProvider::unscripted()).await;

    let delete = AxumTestRequest::delete("/api/chat?id=c1")
        .send(harness.router.clone())
        .await;
    assert_eq!(delete.status(), 401);
}
