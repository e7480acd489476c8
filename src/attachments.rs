// ABOUTME: Attachment normalizer lowering message parts into provider content blocks
// ABOUTME: Inlines images as base64, extracts and truncates PDF text, drops the rest
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Attachment Normalizer
//!
//! Converts stored message history into provider-ready messages. Attachments
//! are resolved per media type:
//!
//! - `image/*`: fetched and inlined as a base64 content block. A fetch failure
//!   skips the attachment (with a warning), it never aborts the turn.
//! - `application/pdf`: fetched, text-extracted best-effort, truncated to
//!   [`PDF_TEXT_BUDGET`] characters, and wrapped as a synthetic text part
//!   carrying a summarization instruction. Extraction failure skips the
//!   attachment.
//! - anything else: dropped.
//!
//! Only user messages carry attachments; assistant and tool history is
//! flattened to plain text.

use crate::config::PDF_TEXT_BUDGET;
use crate::database::MessageRecord;
use crate::errors::AppError;
use crate::llm::{prompts, ContentBlock, ProviderMessage};
use crate::models::{AttachmentRef, MessagePart, MessageRole};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures_util::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetch timeout per attachment
const FETCH_TIMEOUT_SECS: u64 = 20;

/// Attachments larger than this are refused outright (bytes)
const MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

/// Retrieves attachment bytes by URL
///
/// The seam between normalization logic and the network; tests substitute a
/// canned implementation.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Fetch the binary content behind an attachment URL
    async fn fetch(&self, url: &str) -> Result<Bytes, AppError>;
}

/// HTTP fetcher used in production
pub struct HttpAttachmentFetcher {
    client: Client,
}

impl HttpAttachmentFetcher {
    /// Create a fetcher with its own bounded-timeout client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AttachmentFetcher for HttpAttachmentFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::attachment_fetch(format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::attachment_fetch(format!(
                "Attachment fetch returned {status} for {url}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::attachment_fetch(format!("Failed to read {url}: {e}")))?;

        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(AppError::attachment_fetch(format!(
                "Attachment too large ({} bytes): {url}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// Normalizes stored message history into provider messages
pub struct AttachmentNormalizer {
    fetcher: Arc<dyn AttachmentFetcher>,
}

impl AttachmentNormalizer {
    /// Create a normalizer over the given fetcher
    #[must_use]
    pub fn new(fetcher: Arc<dyn AttachmentFetcher>) -> Self {
        Self { fetcher }
    }

    /// Lower a message history into provider-ready messages
    ///
    /// Attachment fetches within one user message run concurrently. Failures
    /// degrade to skipping the affected attachment; this function itself never
    /// fails.
    pub async fn normalize_history(&self, history: &[MessageRecord]) -> Vec<ProviderMessage> {
        let mut out = Vec::with_capacity(history.len());
        for record in history {
            if record.role == MessageRole::User {
                out.push(self.normalize_user_message(&record.parts).await);
            } else if let Some(message) = flatten_to_text(record) {
                out.push(message);
            }
        }
        out
    }

    async fn normalize_user_message(&self, parts: &[MessagePart]) -> ProviderMessage {
        let resolved = join_all(parts.iter().map(|part| self.resolve_part(part))).await;
        let blocks: Vec<ContentBlock> = resolved.into_iter().flatten().collect();

        // A lone text block stays a plain-string message on the wire
        match blocks.as_slice() {
            [ContentBlock::Text { text }] => ProviderMessage::user(text.clone()),
            [] => ProviderMessage::user(String::new()),
            _ => ProviderMessage::user_blocks(blocks),
        }
    }

    async fn resolve_part(&self, part: &MessagePart) -> Option<ContentBlock> {
        match part {
            MessagePart::Text { text } => Some(ContentBlock::Text { text: text.clone() }),
            MessagePart::File { attachment } => self.resolve_attachment(attachment).await,
            MessagePart::ToolCall { .. } | MessagePart::ToolResult { .. } => None,
        }
    }

    async fn resolve_attachment(&self, attachment: &AttachmentRef) -> Option<ContentBlock> {
        if attachment.media_type.starts_with("image/") {
            self.inline_image(attachment).await
        } else if attachment.media_type == "application/pdf" {
            self.inline_pdf_text(attachment).await
        } else {
            debug!(
                media_type = %attachment.media_type,
                "Dropping attachment with unsupported media type"
            );
            None
        }
    }

    async fn inline_image(&self, attachment: &AttachmentRef) -> Option<ContentBlock> {
        match self.fetcher.fetch(&attachment.url).await {
            Ok(bytes) => Some(ContentBlock::InlineImage {
                media_type: attachment.media_type.clone(),
                data: BASE64.encode(&bytes),
            }),
            Err(e) => {
                warn!(url = %attachment.url, error = %e, "Skipping image attachment");
                None
            }
        }
    }

    async fn inline_pdf_text(&self, attachment: &AttachmentRef) -> Option<ContentBlock> {
        let bytes = match self.fetcher.fetch(&attachment.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %attachment.url, error = %e, "Skipping PDF attachment");
                return None;
            }
        };

        // Extraction is CPU-bound, keep it off the async workers
        let extracted = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
        })
        .await;

        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(url = %attachment.url, error = %e, "PDF text extraction failed, skipping");
                return None;
            }
            Err(e) => {
                warn!(url = %attachment.url, error = %e, "PDF extraction task failed, skipping");
                return None;
            }
        };

        let truncated = truncate_chars(&text, PDF_TEXT_BUDGET);
        Some(ContentBlock::Text {
            text: prompts::pdf_attachment_text(attachment.name.as_deref(), &truncated),
        })
    }
}

/// Truncate to at most `budget` characters on a character boundary
fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((byte_pos, _)) => text[..byte_pos].to_owned(),
        None => text.to_owned(),
    }
}

/// Flatten a non-user record to a plain-text provider message
///
/// Tool-call and tool-result parts carry structured payloads the provider has
/// already seen in the turn that produced them; replayed history keeps only
/// the visible text.
fn flatten_to_text(record: &MessageRecord) -> Option<ProviderMessage> {
    let text = record
        .parts
        .iter()
        .filter_map(MessagePart::as_text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return None;
    }
    Some(ProviderMessage::text(record.role, text))
}
