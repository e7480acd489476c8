// ABOUTME: Usage-log persistence: one append-only row of token counts per chat turn
// ABOUTME: Also backs the secondary daily request-count quota check
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{now_rfc3339, window_start_rfc3339, ChatStore};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

/// A persisted accounting row of tokens consumed by one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub model: String,
    /// Request-type tag (e.g. `chat`, `title`, `document`)
    pub request_kind: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub created_at: String,
}

impl ChatStore {
    /// Append one usage row; rows are never mutated afterwards
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Callers on the turn
    /// finalization path swallow and log this error.
    pub async fn save_usage(
        &self,
        user_id: &str,
        model: &str,
        request_kind: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
        total_tokens: i64,
    ) -> AppResult<UsageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO usage_log
                (id, user_id, model, request_kind, prompt_tokens, completion_tokens, total_tokens, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(&id)
        .bind(user_id)
        .bind(model)
        .bind(request_kind)
        .bind(prompt_tokens)
        .bind(completion_tokens)
        .bind(total_tokens)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to save usage row: {e}")))?;

        Ok(UsageRecord {
            id,
            user_id: user_id.to_owned(),
            model: model.to_owned(),
            request_kind: request_kind.to_owned(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            created_at: now,
        })
    }

    /// Fetch a user's usage rows, most recent first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_usage_rows(&self, user_id: &str) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, model, request_kind,
                   prompt_tokens, completion_tokens, total_tokens, created_at
            FROM usage_log
            WHERE user_id = $1
            ORDER BY created_at DESC, rowid DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to load usage rows: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| UsageRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                model: row.get("model"),
                request_kind: row.get("request_kind"),
                prompt_tokens: row.get("prompt_tokens"),
                completion_tokens: row.get("completion_tokens"),
                total_tokens: row.get("total_tokens"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Count usage rows written for a user within the last `hours` hours
    ///
    /// Backs the secondary (request-count) quota; a failure here is treated
    /// as zero by the guard.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn count_usage_rows_since(&self, user_id: &str, hours: i64) -> AppResult<i64> {
        let since = window_start_rfc3339(hours);

        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM usage_log
            WHERE user_id = $1 AND created_at >= $2
            ",
        )
        .bind(user_id)
        .bind(&since)
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to count usage rows: {e}")))?;

        Ok(row.get("count"))
    }
}
