// ABOUTME: Pre-flight rate and quota checks for chat turns
// ABOUTME: Primary per-tier message ceiling plus a secondary daily request ceiling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Rate and Quota Guard
//!
//! Two independent ceilings are checked before any state is written:
//!
//! 1. **Primary (tier message ceiling)**: user-role messages sent within the
//!    rolling 24h window, bounded per entitlement tier. The count query is on
//!    the request's critical path; a database failure here fails the request.
//! 2. **Secondary (daily request ceiling)**: usage rows written within the
//!    same window, bounded by a single configurable value. This check is
//!    advisory: a failed count is logged and treated as zero, the request
//!    proceeds.

use crate::database::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::models::UserTier;
use tracing::{debug, warn};

/// Rolling window for both ceilings (hours)
const WINDOW_HOURS: i64 = 24;

/// Pre-flight guard evaluated once per chat turn
#[derive(Clone)]
pub struct QuotaGuard {
    store: ChatStore,
    daily_request_ceiling: u32,
}

impl QuotaGuard {
    /// Create a guard over the given store
    #[must_use]
    pub const fn new(store: ChatStore, daily_request_ceiling: u32) -> Self {
        Self {
            store,
            daily_request_ceiling,
        }
    }

    /// Check both ceilings for a user; passes silently or returns a 429 error
    ///
    /// # Errors
    ///
    /// - `RateLimitExceeded` when the tier message ceiling is reached
    /// - `QuotaExceeded` when the daily request ceiling is reached
    /// - `DatabaseError` when the primary count query fails
    pub async fn check(&self, user_id: &str, tier: UserTier) -> AppResult<()> {
        self.check_message_ceiling(user_id, tier).await?;
        self.check_request_ceiling(user_id).await
    }

    async fn check_message_ceiling(&self, user_id: &str, tier: UserTier) -> AppResult<()> {
        let limit = tier.max_messages_per_day();
        let count = self
            .store
            .count_user_messages_since(user_id, WINDOW_HOURS)
            .await?;

        debug!(user_id, count, limit, "Tier message ceiling check");
        if count >= i64::from(limit) {
            return Err(AppError::rate_limit_exceeded(limit));
        }
        Ok(())
    }

    async fn check_request_ceiling(&self, user_id: &str) -> AppResult<()> {
        // Advisory ceiling: an unreadable count must not take chat down with it
        let count = match self
            .store
            .count_usage_rows_since(user_id, WINDOW_HOURS)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "Request ceiling count failed, proceeding as zero");
                0
            }
        };

        debug!(
            user_id,
            count,
            limit = self.daily_request_ceiling,
            "Daily request ceiling check"
        );
        if count >= i64::from(self.daily_request_ceiling) {
            return Err(AppError::quota_exceeded(self.daily_request_ceiling));
        }
        Ok(())
    }
}
