// ABOUTME: Environment-based server configuration for the chat pipeline
// ABOUTME: Reads RILL_* variables with sensible defaults and validates at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! Server configuration loaded from environment variables.
//!
//! Environment-only configuration: no config files. Every knob has a default
//! suitable for local development except the completion API key, which is
//! required for the server binary (tests inject a mock provider instead).

use crate::errors::{AppError, AppResult};
use std::env;

/// Default HTTP listen port
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default SQLite database URL
const DEFAULT_DATABASE_URL: &str = "sqlite:rill.db";

/// Default completion endpoint (OpenAI-compatible)
const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when the client does not select one
const DEFAULT_CHAT_MODEL: &str = "chat-model";

/// Global daily request ceiling (secondary quota), overridable
const DEFAULT_DAILY_REQUEST_CEILING: u32 = 100;

/// Maximum sequential tool-invocation steps per chat turn
pub const MAX_TOOL_STEPS: usize = 5;

/// Extracted PDF text is truncated to this many characters
pub const PDF_TEXT_BUDGET: usize = 12_000;

/// How the stream relay delivers events to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Buffered, sequence-numbered, resumable delivery
    Buffered,
    /// Direct pass-through; disconnected clients cannot resume
    Direct,
}

impl RelayMode {
    fn from_str_or_default(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "direct" => Self::Direct,
            _ => Self::Buffered,
        }
    }
}

/// Server configuration assembled from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection URL (SQLite)
    pub database_url: String,
    /// Base URL of the OpenAI-compatible completion endpoint
    pub completion_base_url: String,
    /// API key for the completion endpoint (optional for local servers)
    pub completion_api_key: Option<String>,
    /// Model used when the request does not select one
    pub default_chat_model: String,
    /// Model used for auxiliary calls (titles, document generation)
    pub auxiliary_model: String,
    /// Model-id prefixes that identify reasoning variants (tools disabled)
    pub reasoning_model_prefixes: Vec<String>,
    /// Global daily request ceiling per user (secondary quota)
    pub daily_request_ceiling: u32,
    /// Stream relay mode
    pub relay_mode: RelayMode,
    /// Web-search endpoint; the search tool is disabled when unset
    pub search_endpoint: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when a numeric variable fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let http_port = parse_var("RILL_HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let daily_request_ceiling =
            parse_var("RILL_DAILY_REQUEST_CEILING", DEFAULT_DAILY_REQUEST_CEILING)?;

        let reasoning_model_prefixes = env::var("RILL_REASONING_MODEL_PREFIXES")
            .unwrap_or_else(|_| "chat-model-reasoning".to_owned())
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            http_port,
            database_url: env::var("RILL_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned()),
            completion_base_url: env::var("RILL_COMPLETION_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_COMPLETION_BASE_URL.to_owned()),
            completion_api_key: env::var("RILL_COMPLETION_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            default_chat_model: env::var("RILL_DEFAULT_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_owned()),
            auxiliary_model: env::var("RILL_AUXILIARY_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_owned()),
            reasoning_model_prefixes,
            daily_request_ceiling,
            relay_mode: RelayMode::from_str_or_default(
                &env::var("RILL_RELAY_MODE").unwrap_or_default(),
            ),
            search_endpoint: env::var("RILL_SEARCH_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }

    /// Whether the given model id selects a reasoning variant.
    ///
    /// Reasoning variants answer from context only: the orchestrator passes
    /// them an empty tool set.
    #[must_use]
    pub fn is_reasoning_model(&self, model: &str) -> bool {
        self.reasoning_model_prefixes
            .iter()
            .any(|prefix| model.starts_with(prefix.as_str()))
    }

    /// One-line startup summary for logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "http_port={} database={} completion={} relay={:?} daily_ceiling={}",
            self.http_port,
            self.database_url,
            self.completion_base_url,
            self.relay_mode,
            self.daily_request_ceiling
        )
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("Invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_model_detection() {
        let config = ServerConfig {
            http_port: 8080,
            database_url: "sqlite::memory:".to_owned(),
            completion_base_url: DEFAULT_COMPLETION_BASE_URL.to_owned(),
            completion_api_key: None,
            default_chat_model: DEFAULT_CHAT_MODEL.to_owned(),
            auxiliary_model: DEFAULT_CHAT_MODEL.to_owned(),
            reasoning_model_prefixes: vec!["chat-model-reasoning".to_owned()],
            daily_request_ceiling: 100,
            relay_mode: RelayMode::Buffered,
            search_endpoint: None,
        };

        assert!(config.is_reasoning_model("chat-model-reasoning"));
        assert!(config.is_reasoning_model("chat-model-reasoning-v2"));
        assert!(!config.is_reasoning_model("chat-model"));
    }

    #[test]
    fn test_relay_mode_parsing() {
        assert_eq!(RelayMode::from_str_or_default("direct"), RelayMode::Direct);
        assert_eq!(
            RelayMode::from_str_or_default("buffered"),
            RelayMode::Buffered
        );
        assert_eq!(RelayMode::from_str_or_default(""), RelayMode::Buffered);
    }
}
