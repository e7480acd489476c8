// ABOUTME: Domain types for chats, message parts, attachments, and user tiers
// ABOUTME: Shared between routes, orchestration, persistence, and the normalizer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! Core domain types shared across the pipeline.
//!
//! Message content is an ordered sequence of tagged parts. Parts are stored
//! as JSON in the messages table and travel unchanged between the HTTP body,
//! the store, and the orchestrator; only the attachment normalizer lowers
//! them into provider content blocks.

use serde::{Deserialize, Serialize};

/// Chat visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    /// String form used in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            _ => Err(()),
        }
    }
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// String form used in the database and provider APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Reference to an externally hosted attachment inside a `file` part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Where the binary content lives; fetched on demand during normalization
    pub url: String,
    /// Media type tag (e.g. `image/png`, `application/pdf`)
    pub media_type: String,
    /// Original filename, if the client supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One tagged part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// Plain text
    Text { text: String },
    /// Reference to an uploaded attachment
    File {
        #[serde(flatten)]
        attachment: AttachmentRef,
    },
    /// A tool invocation the model produced
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// The result of a tool invocation
    ToolResult {
        id: String,
        name: String,
        output: serde_json::Value,
    },
}

impl MessagePart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text content of this part, if it is a text part
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// The new message carried by a `POST /api/chat` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Client-generated message id
    pub id: String,
    /// Must be `user` for incoming turns
    pub role: MessageRole,
    /// Ordered message parts
    pub parts: Vec<MessagePart>,
}

impl IncomingMessage {
    /// Concatenated text content of all text parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Entitlement tier for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    Guest,
    Regular,
}

impl UserTier {
    /// Maximum user messages per rolling 24h window for this tier
    #[must_use]
    pub const fn max_messages_per_day(self) -> u32 {
        match self {
            Self::Guest => 20,
            Self::Regular => 100,
        }
    }

    /// String form used in the sessions table
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Regular => "regular",
        }
    }
}

impl std::str::FromStr for UserTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "regular" => Ok(Self::Regular),
            _ => Err(()),
        }
    }
}

/// Coarse request geolocation used to localize the system prompt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoHints {
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoHints {
    /// Whether any hint is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}
