// ABOUTME: Completion provider for any OpenAI-compatible chat completions endpoint
// ABOUTME: Streams deltas, assembles incremental tool-call fragments, captures usage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # `OpenAI`-Compatible Provider
//!
//! Generic implementation for any endpoint that speaks the `OpenAI` chat
//! completions wire format, cloud or local (vLLM, Ollama, `LocalAI`).
//!
//! Streaming specifics this provider owns:
//!
//! - **Tool-call assembly**: the wire protocol delivers tool invocations as
//!   incremental fragments (`id` and `name` once, `arguments` spread over many
//!   deltas, correlated by `index`). Fragments are folded into complete
//!   [`ToolInvocation`] values and emitted as one `ToolCalls` chunk when the
//!   step finishes with `finish_reason: "tool_calls"`.
//! - **Usage capture**: `stream_options.include_usage` asks the endpoint for a
//!   trailing usage chunk, which is passed through as raw JSON on the terminal
//!   `Finish` chunk for the usage recorder to interpret.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use super::sse_parser::{
    create_sse_stream, is_retryable_request_error, is_retryable_status, RetryConfig, SseEvent,
};
use super::{
    CompletionChunk, CompletionProvider, CompletionRequest, CompletionResponse, CompletionStream,
    ContentBlock, ProviderContent, ProviderMessage, ToolDefinition, ToolInvocation,
};
use crate::config::ServerConfig;
use crate::errors::AppError;

/// Connection timeout
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Request timeout (covers the whole streamed response)
const REQUEST_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// API Request/Response Types (OpenAI wire format)
// ============================================================================

/// Chat completions request body
#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

/// Message in the request body
///
/// `content` is either a plain string or an array of typed blocks (the vision
/// extension), so it is carried as a raw JSON value.
#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool definition in the request body
#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

/// Function definition within a tool
#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

/// Tool call echoed back in an assistant message
#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

/// Function call details: arguments travel as a JSON string on the wire
#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

/// Non-streaming response body
#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

/// Choice in a non-streaming response
#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

/// Message in a non-streaming response
#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

/// Streaming chunk body
#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    /// Present only on the trailing usage chunk when requested
    #[serde(default)]
    usage: Option<Value>,
}

/// Choice in a streaming chunk
#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

/// Delta content in a streaming chunk
#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

/// Incremental tool-call fragment, correlated by `index`
#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

/// Incremental function fragment
#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorDetail,
}

/// Error detail
#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for the `OpenAI`-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Base URL for the API (e.g. <https://api.openai.com/v1>)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Model used when the request does not select one
    pub default_model: String,
    /// Retry policy for establishing requests
    pub retry: RetryConfig,
}

impl OpenAiCompatibleConfig {
    /// Derive provider configuration from server configuration
    #[must_use]
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            base_url: config.completion_base_url.clone(),
            api_key: config.completion_api_key.clone(),
            default_model: config.default_chat_model.clone(),
            retry: RetryConfig::default_config(),
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Generic `OpenAI`-compatible completion provider
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    /// Add authorization header if an API key is configured
    fn add_auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("Bearer {api_key}"))
        } else {
            request
        }
    }

    /// Convert an internal message to wire format
    fn convert_message(message: &ProviderMessage) -> WireMessage {
        let content = match &message.content {
            ProviderContent::Text(text) => Value::String(text.clone()),
            ProviderContent::Blocks(blocks) => {
                Value::Array(blocks.iter().map(Self::convert_block).collect())
            }
        };

        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        call_type: "function".to_owned(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.args.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        WireMessage {
            role: message.role.as_str().to_owned(),
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }

    /// Convert a content block to the vision wire format
    fn convert_block(block: &ContentBlock) -> Value {
        match block {
            ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
            ContentBlock::InlineImage { media_type, data } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{media_type};base64,{data}") },
            }),
        }
    }

    /// Convert tool definitions to wire format
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|tool| WireTool {
                tool_type: "function".to_owned(),
                function: WireFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    /// Build the request body shared by streaming and non-streaming calls
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> WireRequest {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let has_tools = !request.tools.is_empty();

        WireRequest {
            model: model.to_owned(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(stream),
            stream_options: stream.then(|| json!({ "include_usage": true })),
            tools: has_tools.then(|| Self::convert_tools(&request.tools)),
            tool_choice: has_tools.then(|| "auto".to_owned()),
        }
    }

    /// Parse an error response from the API
    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        if let Ok(error_response) = serde_json::from_str::<WireErrorResponse>(body) {
            let error_type = error_response
                .error
                .error_type
                .unwrap_or_else(|| "unknown".to_owned());

            match status.as_u16() {
                401 => AppError::auth_invalid(format!(
                    "Completion API authentication failed: {}",
                    error_response.error.message
                )),
                400 => AppError::invalid_input(format!(
                    "Completion API validation error: {}",
                    error_response.error.message
                )),
                404 => AppError::not_found(format!(
                    "Model or endpoint not found: {}",
                    error_response.error.message
                )),
                _ => AppError::external_service(
                    "Completion",
                    format!("{} - {}", error_type, error_response.error.message),
                ),
            }
        } else {
            AppError::external_service(
                "Completion",
                format!(
                    "API error ({}): {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            )
        }
    }

    /// Send the request, retrying transient failures before any bytes flow
    async fn send_with_retry(&self, body: &WireRequest) -> Result<reqwest::Response, AppError> {
        let mut attempt = 0;
        loop {
            let http_request = self
                .client
                .post(self.api_url("chat/completions"))
                .header("Content-Type", "application/json")
                .json(body);

            match self.add_auth_header(http_request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if is_retryable_status(status.as_u16()) && attempt < self.config.retry.max_retries
                    {
                        let delay = self.config.retry.delay_for_attempt(attempt);
                        warn!(
                            status = status.as_u16(),
                            attempt, "Retryable completion API status, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let error_body = response.text().await.unwrap_or_default();
                    return Err(Self::parse_error_response(status, &error_body));
                }
                Err(e) => {
                    if is_retryable_request_error(&e) && attempt < self.config.retry.max_retries {
                        let delay = self.config.retry.delay_for_attempt(attempt);
                        warn!(error = %e, attempt, "Completion request failed, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    error!("Failed to send completion request: {e}");
                    return Err(AppError::external_service(
                        "Completion",
                        format!("Failed to connect: {e}"),
                    ));
                }
            }
        }
    }
}

/// Assembly state for one streaming response
///
/// Folds SSE events into chunks; lives inside the `create_sse_stream` handler
/// closure for the duration of one step.
#[derive(Default)]
struct StreamAssembler {
    /// Partial tool calls keyed by wire `index`
    partial_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Option<Value>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAssembler {
    fn handle(&mut self, event: SseEvent) -> Vec<Result<CompletionChunk, AppError>> {
        match event {
            SseEvent::Data(json_str) => self.handle_data(&json_str),
            SseEvent::Done => vec![Ok(CompletionChunk::Finish {
                reason: self.finish_reason.take(),
                usage: self.usage.take(),
            })],
        }
    }

    fn handle_data(&mut self, json_str: &str) -> Vec<Result<CompletionChunk, AppError>> {
        let chunk: WireStreamChunk = match serde_json::from_str(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Skipping malformed stream chunk: {e}");
                return Vec::new();
            }
        };

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    out.push(Ok(CompletionChunk::TextDelta(text)));
                }
            }

            if let Some(fragments) = choice.delta.tool_calls {
                for fragment in fragments {
                    let partial = self.partial_calls.entry(fragment.index).or_default();
                    if let Some(id) = fragment.id {
                        partial.id = id;
                    }
                    if let Some(function) = fragment.function {
                        if let Some(name) = function.name {
                            partial.name = name;
                        }
                        if let Some(arguments) = function.arguments {
                            partial.arguments.push_str(&arguments);
                        }
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                if reason == "tool_calls" {
                    out.push(Ok(CompletionChunk::ToolCalls(self.take_calls())));
                }
                self.finish_reason = Some(reason);
            }
        }
        out
    }

    /// Finalize accumulated fragments into complete invocations
    fn take_calls(&mut self) -> Vec<ToolInvocation> {
        std::mem::take(&mut self.partial_calls)
            .into_values()
            .map(|partial| {
                let args: Value = serde_json::from_str(&partial.arguments).unwrap_or_default();
                ToolInvocation {
                    id: partial.id,
                    name: partial.name,
                    args,
                }
            })
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AppError> {
        let body = self.build_request(request, false);
        debug!(messages = body.messages.len(), "Sending completion request");

        let response = self.send_with_retry(&body).await?;
        let text = response.text().await.map_err(|e| {
            AppError::external_service("Completion", format!("Failed to read response: {e}"))
        })?;

        let wire_response: WireResponse = serde_json::from_str(&text).map_err(|e| {
            error!(
                "Failed to parse completion response: {e} - body: {}",
                &text[..text.len().min(500)]
            );
            AppError::external_service("Completion", format!("Failed to parse response: {e}"))
        })?;

        let choice = wire_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("Completion", "API returned no choices"))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: wire_response.usage,
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, AppError> {
        let body = self.build_request(request, true);
        debug!(
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "Sending streaming completion request"
        );

        let response = self.send_with_retry(&body).await?;

        let mut assembler = StreamAssembler::default();
        Ok(create_sse_stream(
            response.bytes_stream(),
            move |event| assembler.handle(event),
            "Completion",
        ))
    }
}
