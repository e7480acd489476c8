// ABOUTME: Thin session authentication boundary for HTTP handlers
// ABOUTME: Resolves a bearer header or session cookie to a user id and tier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! Session resolution for request handlers.
//!
//! Identity management itself is out of scope: sessions are rows in the
//! sessions table, provisioned externally. This module only maps the
//! credential carried by a request to a user id and entitlement tier.

use crate::database::ChatStore;
use crate::errors::{AppError, AppResult};
use crate::models::UserTier;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;

/// Cookie carrying the session token for browser clients
const SESSION_COOKIE: &str = "auth_token";

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    pub tier: UserTier,
}

/// Resolve the request's session credential to a user
///
/// Accepts `Authorization: Bearer <token>` or the `auth_token` cookie, in
/// that order.
///
/// # Errors
///
/// - `AuthRequired` when no credential is present
/// - `AuthInvalid` when the token does not match a session
/// - `DatabaseError` when the lookup fails
pub async fn authenticate(store: &ChatStore, headers: &HeaderMap) -> AppResult<AuthedUser> {
    let token = extract_token(headers).ok_or_else(AppError::auth_required)?;

    let session = store
        .get_session(&token)
        .await?
        .ok_or_else(|| AppError::auth_invalid("Unknown session token"))?;

    Ok(AuthedUser {
        user_id: session.user_id,
        tier: session.tier,
    })
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_owned());
            }
        }
    }

    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(cookie_value)
}

/// Pull the session token out of a `Cookie` header
fn cookie_value(cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use axum::http::HeaderValue;

    fn headers_with(name: axum::http::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn bearer_token_resolves_session() {
        let store = ChatStore::connect("sqlite::memory:").await.unwrap();
        store
            .create_session("tok-1", "u1", UserTier::Regular)
            .await
            .unwrap();

        let headers = headers_with(AUTHORIZATION, "Bearer tok-1");
        let user = authenticate(&store, &headers).await.unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.tier, UserTier::Regular);
    }

    #[tokio::test]
    async fn cookie_token_resolves_session() {
        let store = ChatStore::connect("sqlite::memory:").await.unwrap();
        store
            .create_session("tok-2", "u2", UserTier::Guest)
            .await
            .unwrap();

        let headers = headers_with(COOKIE, "theme=dark; auth_token=tok-2");
        let user = authenticate(&store, &headers).await.unwrap();
        assert_eq!(user.user_id, "u2");
    }

    #[tokio::test]
    async fn missing_credential_is_auth_required() {
        let store = ChatStore::connect("sqlite::memory:").await.unwrap();
        let err = authenticate(&store, &HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthRequired);
    }

    #[tokio::test]
    async fn unknown_token_is_auth_invalid() {
        let store = ChatStore::connect("sqlite::memory:").await.unwrap();
        let headers = headers_with(AUTHORIZATION, "Bearer nope");
        let err = authenticate(&store, &headers).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }
}
