// ABOUTME: Document persistence for artifacts produced by the document tools
// ABOUTME: Create/update/get with owner scoping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{now_rfc3339, ChatStore};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// An artifact created or updated by the document tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    /// `text` or `code`
    pub kind: String,
    pub content: String,
    pub created_at: String,
}

impl ChatStore {
    /// Create a document
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_document(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        kind: &str,
        content: &str,
    ) -> AppResult<DocumentRecord> {
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO documents (id, user_id, title, kind, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(kind)
        .bind(content)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create document: {e}")))?;

        Ok(DocumentRecord {
            id: id.to_owned(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            kind: kind.to_owned(),
            content: content.to_owned(),
            created_at: now,
        })
    }

    /// Get a document owned by the given user
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_document(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> AppResult<Option<DocumentRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, title, kind, content, created_at
            FROM documents
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get document: {e}")))?;

        Ok(row.map(|r| DocumentRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            title: r.get("title"),
            kind: r.get("kind"),
            content: r.get("content"),
            created_at: r.get("created_at"),
        }))
    }

    /// Replace a document's content
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_document_content(
        &self,
        document_id: &str,
        user_id: &str,
        content: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE documents
            SET content = $1
            WHERE id = $2 AND user_id = $3
            ",
        )
        .bind(content)
        .bind(document_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to update document: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
