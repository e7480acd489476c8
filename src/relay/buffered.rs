// ABOUTME: Resumable relay: per-stream buffer plus broadcast fan-out
// ABOUTME: Replay-then-live subscription with duplicate suppression by sequence number
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{ChatEvent, EventStream, ProducerStream, StreamEvent, StreamRelay};
use crate::errors::{AppError, AppResult};
use crate::tasks::TaskGroup;
use async_stream::stream;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::StreamExt;
use tracing::debug;

/// Broadcast channel depth per stream
const CHANNEL_CAPACITY: usize = 256;

/// How long a completed stream stays resumable
const RETENTION: Duration = Duration::from_secs(600);

/// Per-stream delivery state
struct StreamState {
    /// Every event published so far, in sequence order
    buffer: RwLock<Vec<StreamEvent>>,
    sender: broadcast::Sender<StreamEvent>,
    done: AtomicBool,
}

impl StreamState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            buffer: RwLock::new(Vec::new()),
            sender,
            done: AtomicBool::new(false),
        }
    }

    /// Number the event, append it to the buffer, and fan it out
    async fn publish(&self, event: ChatEvent) {
        let numbered = {
            let mut buffer = self.buffer.write().await;
            let numbered = StreamEvent {
                seq: buffer.len() as u64,
                event,
            };
            buffer.push(numbered.clone());
            numbered
        };
        // No live subscribers is fine; the buffer retains everything
        let _ = self.sender.send(numbered);
    }
}

/// Buffered, sequence-numbered, resumable relay
#[derive(Clone)]
pub struct BufferedRelay {
    streams: Arc<DashMap<String, Arc<StreamState>>>,
    tasks: TaskGroup,
}

impl BufferedRelay {
    /// Create an empty relay; producer tasks run on the given group
    #[must_use]
    pub fn new(tasks: TaskGroup) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            tasks,
        }
    }

    /// Replay the buffer, then follow live events, ending after `finish`
    ///
    /// The receiver is subscribed before the buffer snapshot is taken, so an
    /// event is either in the snapshot or observed live; live events already
    /// replayed are dropped by sequence number.
    fn attach(state: Arc<StreamState>) -> EventStream {
        Box::pin(stream! {
            let mut receiver = state.sender.subscribe();
            let snapshot: Vec<StreamEvent> = state.buffer.read().await.clone();

            let mut next_seq = 0u64;
            for event in snapshot {
                next_seq = event.seq + 1;
                let finished = event.event == ChatEvent::Finish;
                yield event;
                if finished {
                    return;
                }
            }

            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.seq < next_seq {
                            continue;
                        }
                        next_seq = event.seq + 1;
                        let finished = event.event == ChatEvent::Finish;
                        yield event;
                        if finished {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Catch up from the buffer, then resume following live
                        let replay: Vec<StreamEvent> = state
                            .buffer
                            .read()
                            .await
                            .iter()
                            .filter(|e| e.seq >= next_seq)
                            .cloned()
                            .collect();
                        for event in replay {
                            next_seq = event.seq + 1;
                            let finished = event.event == ChatEvent::Finish;
                            yield event;
                            if finished {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

#[async_trait]
impl StreamRelay for BufferedRelay {
    async fn open(&self, stream_id: &str, mut producer: ProducerStream) -> EventStream {
        let state = Arc::new(StreamState::new());
        self.streams.insert(stream_id.to_owned(), Arc::clone(&state));

        // Detached but tracked: the turn completes server-side no matter what
        // clients do, and shutdown waits for it.
        let producer_state = Arc::clone(&state);
        let streams = Arc::clone(&self.streams);
        let id = stream_id.to_owned();
        self.tasks.spawn(async move {
            while let Some(event) = producer.next().await {
                producer_state.publish(event).await;
            }
            producer_state.done.store(true, Ordering::Release);
            debug!(stream_id = %id, "Stream producer completed");

            // Untracked on purpose: retention must not delay shutdown
            tokio::spawn(async move {
                tokio::time::sleep(RETENTION).await;
                streams.remove(&id);
            });
        });

        Self::attach(state)
    }

    async fn resume(&self, stream_id: &str) -> AppResult<EventStream> {
        let state = self
            .streams
            .get(stream_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AppError::not_found(format!("Stream {stream_id}")))?;
        Ok(Self::attach(state))
    }
}
