// ABOUTME: Completion provider abstraction for pluggable model-serving backends
// ABOUTME: Defines the provider contract with streaming, tool calling, and usage reporting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Completion Provider Service Provider Interface
//!
//! The contract a model-serving backend must implement to drive chat turns.
//! Providers yield an incremental stream of [`CompletionChunk`] values: text
//! deltas as tokens are produced, assembled tool invocations when the model
//! requests tools, and a terminal `Finish` carrying the raw usage summary.
//!
//! Usage is passed through as raw JSON rather than a parsed struct: upstream
//! usage-reporting shapes are unstable, so extraction is a best-effort mapping
//! owned by the usage recorder, not part of this contract.

pub mod prompts;
mod sse_parser;

mod openai_compatible;

pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use sse_parser::{create_sse_stream, SseEvent, SseLineBuffer};

use crate::errors::AppError;
use crate::models::MessageRole;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// One block of user-message content sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { text: String },
    /// Inline image carried as base64 so the model can embed it directly
    InlineImage { media_type: String, data: String },
}

/// Message content: either plain text or an ordered list of blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single provider-ready message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: MessageRole,
    pub content: ProviderContent,
    /// Tool invocations the assistant issued (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    /// Call id this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ProviderMessage {
    /// Create a plain-text message
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: ProviderContent::Text(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Create a user message from content blocks
    #[must_use]
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content: ProviderContent::Blocks(blocks),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message carrying the tool invocations it issued
    #[must_use]
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: ProviderContent::Text(content.into()),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Create a tool message answering one invocation
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: ProviderContent::Text(output.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool the model may invoke, described to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Option<serde_json::Value>,
}

/// A tool invocation assembled from the model's output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call id, echoed back with the result
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// Configuration for a completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Conversation messages, system prompt first
    pub messages: Vec<ProviderMessage>,
    /// Model identifier (provider-specific); `None` uses the default
    pub model: Option<String>,
    /// Tools the model may invoke; empty disables tool calling
    pub tools: Vec<ToolDefinition>,
    /// Temperature for response randomness
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a new request with messages
    #[must_use]
    pub const fn new(messages: Vec<ProviderMessage>) -> Self {
        Self {
            messages,
            model: None,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the model to use
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the available tools
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Response from a non-streaming completion (auxiliary calls)
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text content
    pub content: String,
    /// Raw usage summary as reported by the provider
    pub usage: Option<serde_json::Value>,
    /// Finish reason (stop, length, etc.)
    pub finish_reason: Option<String>,
}

/// A chunk of a streaming completion
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    /// Incremental text output
    TextDelta(String),
    /// The model requested tool invocations; the step is over
    ToolCalls(Vec<ToolInvocation>),
    /// Terminal chunk with the raw usage summary, if the provider sent one
    Finish {
        reason: Option<String>,
        usage: Option<serde_json::Value>,
    },
}

/// Stream type for completion responses
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, AppError>> + Send>>;

/// Completion provider trait
///
/// Implement this trait to plug in a new model-serving backend. The design
/// follows the async trait pattern for compatibility with the tokio runtime.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Unique provider identifier (e.g. "openai", "mock")
    fn name(&self) -> &'static str;

    /// Default model to use if not specified in the request
    fn default_model(&self) -> &str;

    /// Perform a non-streaming completion (titles, document generation)
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, AppError>;

    /// Perform a streaming completion
    ///
    /// Tool invocations are assembled by the provider and emitted as a single
    /// [`CompletionChunk::ToolCalls`] once complete. The stream always ends
    /// with a [`CompletionChunk::Finish`].
    async fn complete_stream(&self, request: &CompletionRequest)
        -> Result<CompletionStream, AppError>;
}
