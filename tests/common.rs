// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Scripted completion provider, stub attachment fetcher, and server wiring
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Shared test setup for the integration suite.
//!
//! Every test runs the real router over an in-memory `SQLite` store; only the
//! network edges are substituted: a scripted completion provider and a canned
//! attachment fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use rill_server::attachments::AttachmentFetcher;
use rill_server::config::{RelayMode, ServerConfig};
use rill_server::database::ChatStore;
use rill_server::errors::AppError;
use rill_server::llm::{
    CompletionChunk, CompletionProvider, CompletionRequest, CompletionResponse, CompletionStream,
};
use rill_server::models::UserTier;
use rill_server::resources::ServerResources;
use rill_server::routes;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// One scripted streaming turn of the mock provider
pub enum ScriptedTurn {
    /// The stream opens and yields these chunks in order
    Stream(Vec<Result<CompletionChunk, AppError>>),
    /// Opening the stream itself fails
    Unavailable(AppError),
}

/// Completion provider driven by a script instead of a backend
///
/// Streaming turns are popped from the script in order; when the script runs
/// out, a minimal text-then-finish turn is synthesized. Every streaming
/// request is recorded for assertions.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<CompletionRequest>>,
    stream_calls: AtomicUsize,
    complete_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            stream_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        })
    }

    /// Provider with no script: every turn is a plain text reply
    pub fn unscripted() -> Arc<Self> {
        Self::new(Vec::new())
    }

    /// Number of streaming invocations made so far
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Number of non-streaming invocations made so far
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Total provider invocations of either kind
    pub fn total_calls(&self) -> usize {
        self.stream_calls() + self.complete_calls()
    }

    /// Copies of every streaming request, in call order
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "chat-model"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, AppError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: "Scripted title".to_owned(),
            usage: None,
            finish_reason: Some("stop".to_owned()),
        })
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, AppError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            Some(ScriptedTurn::Unavailable(e)) => Err(e),
            Some(ScriptedTurn::Stream(chunks)) => Ok(Box::pin(tokio_stream::iter(chunks))),
            None => Ok(Box::pin(tokio_stream::iter(vec![
                Ok(CompletionChunk::TextDelta("Scripted reply".to_owned())),
                Ok(CompletionChunk::Finish {
                    reason: Some("stop".to_owned()),
                    usage: None,
                }),
            ]))),
        }
    }
}

/// Attachment fetcher answering from a canned URL-to-bytes map
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, Bytes>,
}

impl StubFetcher {
    pub fn new(responses: HashMap<String, Bytes>) -> Self {
        Self { responses }
    }

    pub fn with_response(url: &str, bytes: Vec<u8>) -> Self {
        let mut responses = HashMap::new();
        responses.insert(url.to_owned(), Bytes::from(bytes));
        Self { responses }
    }
}

#[async_trait]
impl AttachmentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AppError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::attachment_fetch(format!("No stub for {url}")))
    }
}

/// Standard test configuration over an in-memory database
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database_url: "sqlite::memory:".to_owned(),
        completion_base_url: "http://localhost/v1".to_owned(),
        completion_api_key: None,
        default_chat_model: "chat-model".to_owned(),
        auxiliary_model: "chat-model".to_owned(),
        reasoning_model_prefixes: vec!["chat-model-reasoning".to_owned()],
        daily_request_ceiling: 100,
        relay_mode: RelayMode::Buffered,
        search_endpoint: None,
    }
}

/// A fully wired server over test doubles
pub struct TestHarness {
    pub resources: Arc<ServerResources>,
    pub router: axum::Router,
    pub provider: Arc<ScriptedProvider>,
}

impl TestHarness {
    pub fn store(&self) -> &ChatStore {
        &self.resources.store
    }
}

/// Wire a test server with the default configuration
pub async fn create_test_harness(provider: Arc<ScriptedProvider>) -> TestHarness {
    create_test_harness_with(provider, Arc::new(StubFetcher::default()), test_config()).await
}

/// Wire a test server with a custom fetcher and configuration
pub async fn create_test_harness_with(
    provider: Arc<ScriptedProvider>,
    fetcher: Arc<dyn AttachmentFetcher>,
    config: ServerConfig,
) -> TestHarness {
    init_test_logging();
    let store = ChatStore::connect(&config.database_url)
        .await
        .expect("test store");

    let resources = Arc::new(ServerResources::new(
        config,
        store,
        provider.clone() as Arc<dyn CompletionProvider>,
        fetcher,
    ));
    let router = routes::router(Arc::clone(&resources));

    TestHarness {
        resources,
        router,
        provider,
    }
}

/// Provision a session row and return its bearer header value
pub async fn create_test_session(
    store: &ChatStore,
    token: &str,
    user_id: &str,
    tier: UserTier,
) -> String {
    store
        .create_session(token, user_id, tier)
        .await
        .expect("test session");
    format!("Bearer {token}")
}

/// Standard `POST /api/chat` body with a single text part
pub fn chat_request_body(chat_id: &str, message_id: &str, text: &str) -> Value {
    json!({
        "id": chat_id,
        "message": {
            "id": message_id,
            "role": "user",
            "parts": [{ "type": "text", "text": text }]
        }
    })
}

/// Parse an SSE response body into its JSON data payloads
///
/// Keep-alive comment lines and blank separators are skipped.
pub fn sse_events(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).expect("SSE payload must be JSON"))
        .collect()
}

/// Concatenate the text deltas of a parsed event list
pub fn collected_text(events: &[Value]) -> String {
    events
        .iter()
        .filter(|e| e["type"] == "text-delta")
        .filter_map(|e| e["delta"].as_str())
        .collect()
}

/// Assert gap-free sequence numbers ending in a finish event
pub fn assert_stream_complete(events: &[Value]) {
    for (expected, event) in events.iter().enumerate() {
        assert_eq!(
            event["seq"].as_u64(),
            Some(expected as u64),
            "sequence gap at {expected}"
        );
    }
    assert_eq!(
        events.last().map(|e| e["type"].as_str()),
        Some(Some("finish")),
        "stream must end with finish"
    );
}
