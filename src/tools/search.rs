// ABOUTME: Web search tool proxying queries to a configured search endpoint
// ABOUTME: Registered only when an endpoint is configured
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{required_str, ChatTool, ToolContext};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const SEARCH_TIMEOUT_SECS: u64 = 15;

/// Query a search endpoint and return its JSON results verbatim
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
}

impl WebSearchTool {
    /// Create the tool against the configured endpoint
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl ChatTool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for up-to-date information"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> AppResult<Value> {
        let query = required_str(args, "query")?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| AppError::external_service("Search", format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(
                "Search",
                format!("Endpoint returned {status}"),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::external_service("Search", format!("Invalid response: {e}")))
    }
}
