// ABOUTME: Line-buffering SSE parser shared by streaming completion providers
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # SSE Stream Parser
//!
//! A shared line-buffering parser for Server-Sent Events used by streaming
//! completion providers. Solves two correctness issues:
//!
//! 1. **Multiple events per TCP chunk**: when network buffers batch several SSE
//!    events into a single `bytes_stream()` chunk, all events are emitted.
//!
//! 2. **Partial JSON across TCP boundaries**: when a payload is split across
//!    two TCP chunks, the line buffer accumulates until a complete line arrives.
//!
//! Providers supply a stateful `handle_event` closure that folds [`SseEvent`]
//! values into zero or more [`CompletionChunk`] results. Statefulness matters:
//! tool-call arguments arrive as incremental fragments that must be assembled
//! across many events before a single `ToolCalls` chunk can be emitted. If the
//! byte stream ends without a `[DONE]` marker, a synthetic [`SseEvent::Done`]
//! is fed to the handler so the stream still terminates cleanly.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{Stream, StreamExt};

use super::{CompletionChunk, CompletionStream};
use crate::errors::AppError;

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the JSON string (prefix stripped)
    Data(String),
    /// The `[DONE]` termination signal (OpenAI convention), possibly synthetic
    Done,
}

/// Line-buffering SSE parser that handles partial lines across TCP chunk boundaries
///
/// SSE streams are newline-delimited and TCP does not guarantee alignment
/// between network chunks and event boundaries. Incomplete lines stay buffered
/// until a terminating `\n` arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Accumulated bytes not yet terminated by a newline
    buffer: String,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from a TCP chunk, returning any complete SSE events
    ///
    /// Complete lines are extracted and parsed; a trailing partial line stays
    /// in the buffer for the next `feed()` call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let rest = self.buffer.split_off(newline_pos + 1);
            let line = mem::replace(&mut self.buffer, rest);
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered content as a final event
    ///
    /// Called when the byte stream ends with a partial line (no trailing
    /// newline) still buffered.
    pub fn flush(&mut self) -> Option<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        Self::parse_line(&remaining)
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        let trimmed = line.trim();

        // Empty lines are event separators; non-data fields (event:, id:,
        // retry:, comments) are ignored.
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "data: [DONE]" {
            return Some(SseEvent::Done);
        }
        let data = trimmed.strip_prefix("data: ")?;
        if data.trim().is_empty() {
            return None;
        }
        Some(SseEvent::Data(data.to_owned()))
    }
}

/// Create a properly-buffered completion stream from a raw byte stream
///
/// Wraps a `reqwest` byte stream with SSE line buffering. The `handle_event`
/// closure folds each [`SseEvent`] into zero or more chunks and may keep state
/// between calls (tool-call assembly, usage capture). The closure is guaranteed
/// to see exactly one [`SseEvent::Done`], synthesized at end-of-bytes if the
/// upstream never sent one.
pub fn create_sse_stream<S, F>(
    byte_stream: S,
    handle_event: F,
    provider_name: &'static str,
) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: FnMut(SseEvent) -> Vec<Result<CompletionChunk, AppError>> + Send + 'static,
{
    let state = SseStreamState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        done_seen: false,
        stream_ended: false,
    };

    // unfold keeps parser and handler state across async iterations. Each
    // iteration either drains a pending chunk or reads the next TCP chunk.
    let stream = unfold(
        (
            Box::pin(byte_stream)
                as Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
            state,
            handle_event,
        ),
        move |(mut byte_stream, mut state, mut handle_event)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state, handle_event)));
                }

                if state.stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        for event in state.parser.feed(&bytes) {
                            state.dispatch(event, &mut handle_event);
                        }
                        // Loop to drain pending chunks
                    }
                    Some(Err(e)) => {
                        state.stream_ended = true;
                        return Some((
                            Err(AppError::external_service(
                                provider_name,
                                format!("Stream read error: {e}"),
                            )),
                            (byte_stream, state, handle_event),
                        ));
                    }
                    None => {
                        state.stream_ended = true;
                        if let Some(event) = state.parser.flush() {
                            state.dispatch(event, &mut handle_event);
                        }
                        // Upstream closed without [DONE]; synthesize it so the
                        // handler can emit its terminal chunk.
                        if !state.done_seen {
                            state.dispatch(SseEvent::Done, &mut handle_event);
                        }
                        if let Some(item) = state.pending.pop_front() {
                            return Some((item, (byte_stream, state, handle_event)));
                        }
                        return None;
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

/// Internal state for the SSE stream unfold
struct SseStreamState {
    parser: SseLineBuffer,
    pending: VecDeque<Result<CompletionChunk, AppError>>,
    done_seen: bool,
    stream_ended: bool,
}

impl SseStreamState {
    fn dispatch<F>(&mut self, event: SseEvent, handle_event: &mut F)
    where
        F: FnMut(SseEvent) -> Vec<Result<CompletionChunk, AppError>>,
    {
        if event == SseEvent::Done {
            if self.done_seen {
                return;
            }
            self.done_seen = true;
        }
        self.pending.extend(handle_event(event));
    }
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// Retry configuration for the initial streaming HTTP request
///
/// Retries only cover establishing the request. Once bytes start flowing the
/// stream is not retried (the client may have already consumed partial output).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay before first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay cap for exponential backoff (milliseconds)
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Default retry config: 3 retries, 500ms initial, 5s max
    #[must_use]
    pub const fn default_config() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }

    /// Exponential backoff delay with jitter for a given attempt
    ///
    /// `delay = min(initial_ms * 2^attempt, max_ms) + jitter(0..100ms)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay_ms.saturating_mul(1_u64 << attempt);
        let capped_delay = base_delay.min(self.max_delay_ms);
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::from(d.subsec_millis()))
            % 100;
        Duration::from_millis(capped_delay + jitter)
    }
}

/// Whether an HTTP error status is a transient condition worth retrying
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503)
}

/// Whether a request error is retryable (connection/timeout errors)
#[must_use]
pub fn is_retryable_request_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}
