// ABOUTME: SQLite persistence layer for chats, messages, usage, streams, and sessions
// ABOUTME: Exposes ChatStore, a thin sqlx wrapper with an idempotent schema migration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! Persistence layer.
//!
//! All tables live in one SQLite database. The store is cheap to clone
//! (`SqlitePool` is an `Arc` internally) and is shared through
//! `ServerResources`. Schema setup is an idempotent `migrate()` so tests can
//! run against `sqlite::memory:` without external tooling.

mod chat;
mod documents;
mod sessions;
mod streams;
mod usage;

pub use chat::{ChatRecord, MessageRecord, NewMessage};
pub use documents::DocumentRecord;
pub use sessions::SessionRecord;
pub use streams::StreamIdRecord;
pub use usage::UsageRecord;

use crate::errors::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Schema statements executed by [`ChatStore::migrate`]
const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS chats (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        visibility TEXT NOT NULL DEFAULT 'private',
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        parts TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_messages_chat_created
    ON messages(chat_id, created_at)
    ",
    r"
    CREATE TABLE IF NOT EXISTS stream_ids (
        id TEXT PRIMARY KEY,
        chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS usage_log (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        model TEXT NOT NULL,
        request_kind TEXT NOT NULL,
        prompt_tokens INTEGER NOT NULL,
        completion_tokens INTEGER NOT NULL,
        total_tokens INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_usage_user_created
    ON usage_log(user_id, created_at)
    ",
    r"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        kind TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        tier TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    ",
];

/// Chat database operations store
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Create a store over an existing pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database and run the schema migration
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or migration fails.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::database(format!("Invalid database URL {database_url}: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory SQLite database exists per connection; more than one
        // pooled connection would hand out empty databases.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to {database_url}: {e}")))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create all tables if they do not already exist
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails.
    pub async fn migrate(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Schema migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Access the underlying pool (shared with submodule impls)
    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// RFC 3339 timestamp for row creation
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// RFC 3339 timestamp for the start of the rolling 24h window
pub(crate) fn window_start_rfc3339(hours: i64) -> String {
    (chrono::Utc::now() - chrono::Duration::hours(hours)).to_rfc3339()
}
