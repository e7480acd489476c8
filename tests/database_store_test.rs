// ABOUTME: Integration tests for the SQLite store against a file-backed database
// ABOUTME: Covers migration idempotency, cascade deletes, and message ordering
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::init_test_logging;
use rill_server::database::{ChatStore, NewMessage};
use rill_server::models::{MessagePart, MessageRole, Visibility};

/// Store backed by a real file in a temporary directory
async fn file_backed_store(dir: &tempfile::TempDir) -> (String, ChatStore) {
    init_test_logging();
    let url = format!("sqlite:{}", dir.path().join("rill.db").display());
    let store = ChatStore::connect(&url).await.unwrap();
    (url, store)
}

#[tokio::test]
async fn connect_creates_the_database_file_and_migration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (url, store) = file_backed_store(&dir).await;

    store
        .create_chat("c1", "u1", "persisted", Visibility::Private)
        .await
        .unwrap();
    store.migrate().await.unwrap();

    // A second connection to the same file sees the data
    let reopened = ChatStore::connect(&url).await.unwrap();
    let chat = reopened.get_chat("c1").await.unwrap().unwrap();
    assert_eq!(chat.title, "persisted");
}

#[tokio::test]
async fn deleting_a_chat_cascades_to_messages_and_stream_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (_, store) = file_backed_store(&dir).await;

    store
        .create_chat("c1", "u1", "t", Visibility::Private)
        .await
        .unwrap();
    store
        .save_messages(&[NewMessage {
            id: "m1".to_owned(),
            chat_id: "c1".to_owned(),
            role: MessageRole::User,
            parts: vec![MessagePart::text("hi")],
        }])
        .await
        .unwrap();
    store.create_stream_id("s1", "c1").await.unwrap();

    let deleted = store.delete_chat("c1").await.unwrap().unwrap();
    assert_eq!(deleted.id, "c1");

    assert!(store.get_chat("c1").await.unwrap().is_none());
    assert!(store.get_messages("c1").await.unwrap().is_empty());
    assert!(store.latest_stream_id("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn messages_come_back_in_insertion_order_with_parts_intact() {
    let dir = tempfile::tempdir().unwrap();
    let (_, store) = file_backed_store(&dir).await;

    store
        .create_chat("c1", "u1", "t", Visibility::Private)
        .await
        .unwrap();
    let batch: Vec<NewMessage> = (0..5)
        .map(|i| NewMessage {
            id: format!("m{i}"),
            chat_id: "c1".to_owned(),
            role: if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            },
            parts: vec![MessagePart::text(format!("message {i}"))],
        })
        .collect();
    store.save_messages(&batch).await.unwrap();

    let messages = store.get_messages("c1").await.unwrap();
    assert_eq!(messages.len(), 5);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.id, format!("m{i}"));
        assert_eq!(message.parts[0].as_text(), Some(format!("message {i}").as_str()));
    }
}

#[tokio::test]
async fn structured_parts_round_trip_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let (_, store) = file_backed_store(&dir).await;

    store
        .create_chat("c1", "u1", "t", Visibility::Private)
        .await
        .unwrap();
    let parts = vec![
        MessagePart::ToolCall {
            id: "call_1".to_owned(),
            name: "get_weather".to_owned(),
            args: serde_json::json!({ "latitude": 48.85, "longitude": 2.35 }),
        },
        MessagePart::ToolResult {
            id: "call_1".to_owned(),
            name: "get_weather".to_owned(),
            output: serde_json::json!({ "temperature": 19.5 }),
        },
        MessagePart::text("It is 19.5 degrees in Paris."),
    ];
    store
        .save_messages(&[NewMessage {
            id: "m1".to_owned(),
            chat_id: "c1".to_owned(),
            role: MessageRole::Assistant,
            parts: parts.clone(),
        }])
        .await
        .unwrap();

    let messages = store.get_messages("c1").await.unwrap();
    assert_eq!(messages[0].parts, parts);
}
