// ABOUTME: Stream-handle persistence correlating in-flight completions to chats
// ABOUTME: The relay uses the most recent handle for reconnect-and-resume
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{now_rfc3339, ChatStore};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// A stream handle correlating an in-flight completion to a chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamIdRecord {
    pub id: String,
    pub chat_id: String,
    pub created_at: String,
}

impl ChatStore {
    /// Record a new stream handle for a chat
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_stream_id(&self, stream_id: &str, chat_id: &str) -> AppResult<()> {
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO stream_ids (id, chat_id, created_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(stream_id)
        .bind(chat_id)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create stream id: {e}")))?;

        Ok(())
    }

    /// Most recent stream handle for a chat, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn latest_stream_id(&self, chat_id: &str) -> AppResult<Option<StreamIdRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, chat_id, created_at
            FROM stream_ids
            WHERE chat_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            ",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get stream id: {e}")))?;

        Ok(row.map(|r| StreamIdRecord {
            id: r.get("id"),
            chat_id: r.get("chat_id"),
            created_at: r.get("created_at"),
        }))
    }
}
