// ABOUTME: Tracked background task group joined during graceful shutdown
// ABOUTME: Keeps turn finalization from being cut off when the process exits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::debug;

/// A group of detached background tasks the shutdown sequence waits on
///
/// Producer tasks finish persistence and usage recording after the HTTP
/// response may already be gone; the server joins this group before exiting
/// so those writes are not lost to process teardown.
#[derive(Clone, Default)]
pub struct TaskGroup {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskGroup {
    /// Create an empty group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|handle| !handle.is_finished());
        handles.push(tokio::spawn(future));
    }

    /// Number of tasks not yet finished
    #[must_use]
    pub fn active(&self) -> usize {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every tracked task to finish
    pub async fn wait(&self) {
        loop {
            let handle = {
                let mut handles = self
                    .handles
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                handles.pop()
            };
            match handle {
                Some(handle) => {
                    if let Err(e) = handle.await {
                        debug!(error = %e, "Background task ended abnormally");
                    }
                }
                None => break,
            }
        }
    }
}
