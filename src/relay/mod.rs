// ABOUTME: Stream relay between the turn producer and SSE clients
// ABOUTME: Defines the event vocabulary and the resumable/direct delivery contract
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Stream Relay
//!
//! The relay decouples producing a chat turn from delivering it. The producer
//! stream is always driven by a detached server-side task, so persistence and
//! usage finalization at the end of the turn complete even when every client
//! has disconnected.
//!
//! Two implementations share one contract and one wire format:
//!
//! - [`BufferedRelay`]: per-stream event buffer plus a broadcast channel.
//!   Every event carries a monotonically increasing sequence number; a
//!   resumed client replays buffered events and then follows live ones with
//!   no duplicates and no gaps.
//! - [`DirectRelay`]: pass-through channel; resuming returns not-found.

mod buffered;
mod direct;

pub use buffered::BufferedRelay;
pub use direct::DirectRelay;

use crate::errors::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// One event of a chat turn, as sent over SSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// Incremental assistant text
    TextDelta { delta: String },
    /// The model invoked a tool
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// A tool invocation completed
    ToolResult {
        id: String,
        name: String,
        output: serde_json::Value,
    },
    /// The turn failed mid-stream; a `finish` event still follows
    Error { message: String },
    /// Terminal event of every turn
    Finish,
}

/// A sequence-numbered event as delivered to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Monotonically increasing, starting at zero, no gaps per stream
    pub seq: u64,
    #[serde(flatten)]
    pub event: ChatEvent,
}

/// Unnumbered events produced by the orchestrator
pub type ProducerStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Numbered events as consumed by an SSE client
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Delivery strategy between turn producers and SSE clients
#[async_trait]
pub trait StreamRelay: Send + Sync {
    /// Start a new stream: spawn a detached task driving `producer` to
    /// completion and return the initiating client's view of the events.
    async fn open(&self, stream_id: &str, producer: ProducerStream) -> EventStream;

    /// Re-attach to an existing stream, replaying from the first event.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when the stream is unknown, expired, or the
    /// relay does not retain events.
    async fn resume(&self, stream_id: &str) -> AppResult<EventStream>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio_stream::StreamExt;

    /// Drain a client stream into a vector
    pub async fn collect(mut stream: EventStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    /// Assert a gap-free sequence ending in a finish event
    pub fn assert_complete(events: &[StreamEvent]) {
        for (expected, event) in events.iter().enumerate() {
            assert_eq!(event.seq, expected as u64, "sequence gap at {expected}");
        }
        assert_eq!(
            events.last().map(|e| &e.event),
            Some(&ChatEvent::Finish),
            "stream must end with finish"
        );
    }
}
