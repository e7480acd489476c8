// ABOUTME: Unified error handling for the chat pipeline with HTTP status mapping
// ABOUTME: Defines AppError, ErrorCode taxonomy, and the JSON error response format
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Unified Error Handling
//!
//! Centralized error types for the chat request pipeline. Every error carries
//! an [`ErrorCode`] that maps to an HTTP status, so handlers can simply return
//! `AppError` and get a consistent JSON body.
//!
//! Errors that occur after the response stream has opened can no longer change
//! the HTTP status; the orchestrator encodes those as in-band `error` events
//! and only logs the underlying cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication & ownership
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired,
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid,
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,

    // Quotas
    #[serde(rename = "RATE_LIMIT_EXCEEDED")]
    RateLimitExceeded,
    #[serde(rename = "QUOTA_EXCEEDED")]
    QuotaExceeded,

    // Validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,

    // Resources
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,

    // External collaborators
    #[serde(rename = "EXTERNAL_SERVICE_ERROR")]
    ExternalServiceError,
    #[serde(rename = "ATTACHMENT_FETCH_ERROR")]
    AttachmentFetchError,

    // Configuration
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,

    // Internal
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "USAGE_PERSISTENCE_ERROR")]
    UsagePersistenceError,
    #[serde(rename = "STREAM_INTERNAL_ERROR")]
    StreamInternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::AuthRequired | Self::AuthInvalid => 401,
            Self::PermissionDenied => 403,
            Self::ResourceNotFound => 404,
            Self::RateLimitExceeded | Self::QuotaExceeded => 429,
            Self::ExternalServiceError | Self::AttachmentFetchError => 502,
            Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError
            | Self::UsagePersistenceError
            | Self::StreamInternalError => 500,
        }
    }

    /// Get a user-facing description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided session credentials are invalid",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::RateLimitExceeded => "Daily message limit reached",
            Self::QuotaExceeded => "Daily request quota exceeded",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ExternalServiceError => "An external service encountered an error",
            Self::AttachmentFetchError => "An attachment could not be fetched",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::UsagePersistenceError => "Usage record could not be persisted",
            Self::StreamInternalError => "The response stream failed",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid session token
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Caller does not own the target resource
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Primary (message-count) ceiling exceeded
    #[must_use]
    pub fn rate_limit_exceeded(limit: u32) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Daily limit of {limit} messages exceeded"),
        )
    }

    /// Secondary (request-count) ceiling exceeded
    #[must_use]
    pub fn quota_exceeded(limit: u32) -> Self {
        Self::new(
            ErrorCode::QuotaExceeded,
            format!("Daily request quota of {limit} exceeded"),
        )
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// External service error
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{}: {}", service.into(), message.into()),
        )
    }

    /// Per-attachment fetch failure (swallowed by the normalizer, never fatal)
    pub fn attachment_fetch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AttachmentFetchError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorResponseDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    pub code: ErrorCode,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // The secondary quota ceiling surfaces as a plain `{ message }` body
        // rather than the structured error envelope.
        if self.code == ErrorCode::QuotaExceeded {
            let body = serde_json::json!({ "message": self.message });
            return (status, Json(body)).into_response();
        }

        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InternalError, error.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, error.to_string())
    }
}
