// ABOUTME: Pass-through relay without buffering; disconnected clients cannot resume
// ABOUTME: The producer still runs detached to completion for persistence guarantees
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{EventStream, ProducerStream, StreamEvent, StreamRelay};
use crate::errors::{AppError, AppResult};
use crate::tasks::TaskGroup;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// Channel depth between producer and the single client
const CHANNEL_CAPACITY: usize = 256;

/// Unbuffered relay: events go straight to the initiating client
#[derive(Clone, Default)]
pub struct DirectRelay {
    tasks: TaskGroup,
}

impl DirectRelay {
    /// Create the relay; producer tasks run on the given group
    #[must_use]
    pub const fn new(tasks: TaskGroup) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl StreamRelay for DirectRelay {
    async fn open(&self, stream_id: &str, mut producer: ProducerStream) -> EventStream {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);

        // Detached: if the client goes away the send fails, but the producer
        // is still drained so end-of-turn persistence runs.
        let id = stream_id.to_owned();
        self.tasks.spawn(async move {
            let mut seq = 0u64;
            let mut client_gone = false;
            while let Some(event) = producer.next().await {
                if !client_gone {
                    let numbered = StreamEvent { seq, event };
                    if sender.send(numbered).await.is_err() {
                        debug!(stream_id = %id, "Client disconnected, draining producer");
                        client_gone = true;
                    }
                }
                seq += 1;
            }
            debug!(stream_id = %id, "Stream producer completed");
        });

        Box::pin(ReceiverStream::new(receiver))
    }

    async fn resume(&self, stream_id: &str) -> AppResult<EventStream> {
        Err(AppError::not_found(format!("Stream {stream_id}")))
    }
}
