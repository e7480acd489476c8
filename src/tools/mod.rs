// ABOUTME: Chat tool trait and registry for model-invocable side effects
// ABOUTME: Execution failures become error payloads in the tool result, never HTTP errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Chat Tools
//!
//! Tools the model may invoke during a turn. Each tool declares a JSON schema
//! for its arguments and executes against a [`ToolContext`] scoped to the
//! requesting user. The registry hands the orchestrator wire-ready
//! [`ToolDefinition`]s and dispatches invocations by name.
//!
//! A tool failure is part of the conversation, not of the transport: the
//! error is serialized into the tool result so the model can react to it.

mod documents;
mod search;
mod weather;

pub use documents::{CreateDocumentTool, RequestSuggestionsTool, UpdateDocumentTool};
pub use search::WebSearchTool;
pub use weather::WeatherTool;

use crate::config::ServerConfig;
use crate::database::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::llm::{CompletionProvider, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-invocation context handed to a tool
#[derive(Clone)]
pub struct ToolContext {
    /// Persistence handle
    pub store: ChatStore,
    /// Provider used for auxiliary completion calls
    pub provider: Arc<dyn CompletionProvider>,
    /// Model for auxiliary calls
    pub auxiliary_model: String,
    /// User on whose behalf the tool runs; scopes all persistence
    pub user_id: String,
}

/// A tool the model may invoke during a chat turn
#[async_trait]
pub trait ChatTool: Send + Sync {
    /// Wire name of the tool
    fn name(&self) -> &'static str;

    /// Description shown to the model
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments
    fn parameters(&self) -> Value;

    /// Execute the tool with the model-supplied arguments
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> AppResult<Value>;
}

/// Registry of available tools, keyed by wire name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn ChatTool>>,
}

impl ToolRegistry {
    /// Build the registry for the given configuration
    ///
    /// The search tool is only present when a search endpoint is configured.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(WeatherTool::new()));
        registry.register(Arc::new(CreateDocumentTool));
        registry.register(Arc::new(UpdateDocumentTool));
        registry.register(Arc::new(RequestSuggestionsTool));
        if let Some(endpoint) = &config.search_endpoint {
            registry.register(Arc::new(WebSearchTool::new(endpoint.clone())));
        }
        registry
    }

    /// Add a tool to the registry
    pub fn register(&mut self, tool: Arc<dyn ChatTool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Whether any tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a tool with this name is registered
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Wire-ready definitions of all registered tools
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: Some(tool.parameters()),
            })
            .collect()
    }

    /// Execute a tool by name, encoding any failure as an error payload
    pub async fn execute(&self, name: &str, args: &Value, ctx: &ToolContext) -> Value {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Model invoked unknown tool");
            return error_payload(&AppError::not_found(format!("Tool {name}")));
        };

        debug!(tool = name, "Executing tool");
        match tool.execute(args, ctx).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                error_payload(&e)
            }
        }
    }
}

/// Error payload fed back to the model inside a tool result
fn error_payload(error: &AppError) -> Value {
    json!({ "error": error.to_string() })
}

/// Read a required string argument from model-supplied args
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> AppResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::invalid_input(format!("Missing argument: {key}")))
}

/// Read a required number argument from model-supplied args
pub(crate) fn required_f64(args: &Value, key: &str) -> AppResult<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| AppError::invalid_input(format!("Missing argument: {key}")))
}
