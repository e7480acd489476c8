// ABOUTME: Main library entry point for the Rill chat backend
// ABOUTME: Request validation, quota, attachment normalization, streaming turns, persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

#![deny(unsafe_code)]

//! # Rill Server
//!
//! Backend for a streaming AI chat application. A chat turn flows through a
//! fixed pipeline: request validation, session resolution, rate and quota
//! checks, attachment normalization, a bounded tool-calling completion loop,
//! and resumable SSE delivery, ending with batch message persistence and
//! usage recording that survive client disconnects.
//!
//! ## Architecture
//!
//! - **routes**: HTTP surface (`POST /api/chat`, resume, delete, health)
//! - **orchestrator**: drives one turn end to end
//! - **llm**: completion provider SPI plus the `OpenAI`-compatible impl
//! - **attachments**: image inlining and PDF text extraction
//! - **relay**: buffered (resumable) or direct event delivery
//! - **quota**: per-tier message ceiling and daily request ceiling
//! - **database**: `SQLite` store for chats, messages, usage, sessions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rill_server::config::ServerConfig;
//! use rill_server::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Rill server configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod quota;
pub mod relay;
pub mod resources;
pub mod routes;
pub mod tasks;
pub mod tools;
pub mod usage;
