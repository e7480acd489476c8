// ABOUTME: Database operations for chats and their append-only message history
// ABOUTME: Handles chat CRUD with owner isolation and batch message persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{now_rfc3339, window_start_rfc3339, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::models::{MessagePart, MessageRole, Visibility};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Database representation of a chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Unique chat id (client-supplied UUID)
    pub id: String,
    /// User who owns the chat; immutable after creation
    pub user_id: String,
    /// Title generated from the first user message
    pub title: String,
    /// Chat visibility
    pub visibility: Visibility,
    /// When the chat was created (ISO 8601)
    pub created_at: String,
}

/// Database representation of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique message id
    pub id: String,
    /// Chat this message belongs to
    pub chat_id: String,
    /// Role of the sender
    pub role: MessageRole,
    /// Ordered tagged parts
    pub parts: Vec<MessagePart>,
    /// When the message was created (ISO 8601)
    pub created_at: String,
}

/// A message to persist; ids may be client-supplied or generated
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

impl ChatStore {
    /// Create a new chat
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_chat(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
        visibility: Visibility,
    ) -> AppResult<ChatRecord> {
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO chats (id, user_id, title, visibility, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(visibility.as_str())
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat: {e}")))?;

        Ok(ChatRecord {
            id: id.to_owned(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            visibility,
            created_at: now,
        })
    }

    /// Get a chat by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_chat(&self, chat_id: &str) -> AppResult<Option<ChatRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, title, visibility, created_at
            FROM chats
            WHERE id = $1
            ",
        )
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get chat: {e}")))?;

        row.map(|r| chat_from_row(&r)).transpose()
    }

    /// Delete a chat and its messages (cascade), returning the deleted record
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_chat(&self, chat_id: &str) -> AppResult<Option<ChatRecord>> {
        let Some(chat) = self.get_chat(chat_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::database(format!("Failed to delete chat: {e}")))?;

        Ok(Some(chat))
    }

    /// Get all messages for a chat in creation order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_messages(&self, chat_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, chat_id, role, parts, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(chat_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get messages: {e}")))?;

        rows.iter().map(message_from_row).collect()
    }

    /// Persist a batch of messages in one transaction
    ///
    /// The whole turn's output is written at once so a retried turn never
    /// leaves partial assistant rows behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; no rows are written.
    pub async fn save_messages(&self, messages: &[NewMessage]) -> AppResult<Vec<MessageRecord>> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let mut saved = Vec::with_capacity(messages.len());
        for message in messages {
            let now = now_rfc3339();
            let parts_json = serde_json::to_string(&message.parts)
                .map_err(|e| AppError::database(format!("Failed to encode parts: {e}")))?;

            sqlx::query(
                r"
                INSERT INTO messages (id, chat_id, role, parts, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(&message.id)
            .bind(&message.chat_id)
            .bind(message.role.as_str())
            .bind(&parts_json)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save message: {e}")))?;

            saved.push(MessageRecord {
                id: message.id.clone(),
                chat_id: message.chat_id.clone(),
                role: message.role,
                parts: message.parts.clone(),
                created_at: now,
            });
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit messages: {e}")))?;

        Ok(saved)
    }

    /// Count user-role messages sent by a user within the last `hours` hours
    ///
    /// Backs the primary (tier) rate-limit check; a failure here is fatal to
    /// the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn count_user_messages_since(&self, user_id: &str, hours: i64) -> AppResult<i64> {
        let since = window_start_rfc3339(hours);

        let row = sqlx::query(
            r"
            SELECT COUNT(m.id) as count
            FROM messages m
            JOIN chats c ON c.id = m.chat_id
            WHERE c.user_id = $1 AND m.role = 'user' AND m.created_at >= $2
            ",
        )
        .bind(user_id)
        .bind(&since)
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to count messages: {e}")))?;

        Ok(row.get("count"))
    }
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<ChatRecord> {
    let visibility: String = row.get("visibility");
    let visibility = visibility
        .parse::<Visibility>()
        .map_err(|()| AppError::database(format!("Unknown visibility: {visibility}")))?;

    Ok(ChatRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        visibility,
        created_at: row.get("created_at"),
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<MessageRecord> {
    let role: String = row.get("role");
    let role = match role.as_str() {
        "system" => MessageRole::System,
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        other => return Err(AppError::database(format!("Unknown role: {other}"))),
    };

    let parts_json: String = row.get("parts");
    let parts = serde_json::from_str(&parts_json)
        .map_err(|e| AppError::database(format!("Failed to decode parts: {e}")))?;

    Ok(MessageRecord {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        role,
        parts,
        created_at: row.get("created_at"),
    })
}
