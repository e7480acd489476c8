// ABOUTME: Session-token lookup backing the thin authentication boundary
// ABOUTME: Maps bearer tokens to user ids and entitlement tiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{now_rfc3339, ChatStore};
use crate::errors::{AppError, AppResult};
use crate::models::UserTier;
use sqlx::Row;

/// A resolved session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub tier: UserTier,
}

impl ChatStore {
    /// Resolve a bearer token to a session, if one exists
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_session(&self, token: &str) -> AppResult<Option<SessionRecord>> {
        let row = sqlx::query(
            r"
            SELECT user_id, tier
            FROM sessions
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get session: {e}")))?;

        row.map(|r| {
            let tier: String = r.get("tier");
            let tier = tier
                .parse::<UserTier>()
                .map_err(|()| AppError::database(format!("Unknown tier: {tier}")))?;
            Ok(SessionRecord {
                user_id: r.get("user_id"),
                tier,
            })
        })
        .transpose()
    }

    /// Insert a session row (used by provisioning and tests)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_session(
        &self,
        token: &str,
        user_id: &str,
        tier: UserTier,
    ) -> AppResult<()> {
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO sessions (token, user_id, tier, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(token)
        .bind(user_id)
        .bind(tier.as_str())
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;

        Ok(())
    }
}
