// ABOUTME: Token-usage extraction and recording for completed chat turns
// ABOUTME: Tolerates inconsistent provider field names; write failures never fail the turn
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Usage Recorder
//!
//! Providers report token usage under inconsistently named fields depending on
//! backend and API version. Extraction tries each known alias in order and
//! falls back to zero; a turn whose usage cannot be parsed still gets its row,
//! with all counts zero. Recording happens after the stream is drained, on the
//! server side, so it runs even when the client has disconnected, and a write
//! failure is logged and swallowed.

use crate::database::ChatStore;
use serde_json::Value;
use tracing::{debug, warn};

/// Token counts extracted from a provider usage summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounts {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Field aliases observed across provider backends
const PROMPT_ALIASES: &[&str] = &["prompt_tokens", "input_tokens", "promptTokens", "inputTokens"];
const COMPLETION_ALIASES: &[&str] = &[
    "completion_tokens",
    "output_tokens",
    "completionTokens",
    "outputTokens",
];
const TOTAL_ALIASES: &[&str] = &["total_tokens", "totalTokens"];

/// Extract token counts from a raw provider usage summary
///
/// Missing or unparseable fields default to zero. A missing total is derived
/// from the other two counts.
#[must_use]
pub fn extract_token_counts(usage: Option<&Value>) -> TokenCounts {
    let Some(usage) = usage else {
        return TokenCounts::default();
    };

    let prompt_tokens = first_numeric(usage, PROMPT_ALIASES);
    let completion_tokens = first_numeric(usage, COMPLETION_ALIASES);
    let mut total_tokens = first_numeric(usage, TOTAL_ALIASES);
    if total_tokens == 0 {
        total_tokens = prompt_tokens + completion_tokens;
    }

    TokenCounts {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    }
}

fn first_numeric(usage: &Value, aliases: &[&str]) -> i64 {
    aliases
        .iter()
        .find_map(|key| usage.get(*key).and_then(Value::as_i64))
        .unwrap_or(0)
}

/// Persist one usage row for a completed turn
///
/// Never fails: extraction falls back to zero counts and a write failure is
/// logged and swallowed so it cannot affect the user-visible turn.
pub async fn record_usage(
    store: &ChatStore,
    user_id: &str,
    model: &str,
    request_kind: &str,
    raw_usage: Option<&Value>,
) {
    let counts = extract_token_counts(raw_usage);
    if counts == TokenCounts::default() && raw_usage.is_some() {
        warn!(user_id, model, "Provider usage summary was unparseable, recording zeros");
    }

    match store
        .save_usage(
            user_id,
            model,
            request_kind,
            counts.prompt_tokens,
            counts.completion_tokens,
            counts.total_tokens,
        )
        .await
    {
        Ok(record) => debug!(
            user_id,
            model,
            total_tokens = record.total_tokens,
            "Recorded usage row"
        ),
        Err(e) => warn!(user_id, model, error = %e, "Failed to record usage row"),
    }
}
