// ABOUTME: Logging configuration and structured logging setup for the chat server
// ABOUTME: Configures tracing-subscriber output format and level filtering from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! Production-ready logging configuration with structured output

use anyhow::Result;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        let include_location = env::var("LOG_LOCATION").as_deref() == Ok("true");

        Self {
            level,
            format,
            include_location,
        }
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a subscriber has already been installed.
    pub fn init(&self) -> Result<()> {
        let filter = EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));

        match self.format {
            LogFormat::Json => {
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()?;
            }
            LogFormat::Pretty => {
                let layer = tracing_subscriber::fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()?;
            }
            LogFormat::Compact => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()?;
            }
        }

        Ok(())
    }
}

/// Initialize logging from environment variables
///
/// # Errors
///
/// Returns an error if a subscriber has already been installed.
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}
