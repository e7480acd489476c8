// ABOUTME: Shared server resources threaded through HTTP handlers as axum state
// ABOUTME: Wires store, provider, normalizer, tools, relay, and quota together
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use crate::attachments::{AttachmentFetcher, AttachmentNormalizer};
use crate::config::{RelayMode, ServerConfig};
use crate::database::ChatStore;
use crate::llm::CompletionProvider;
use crate::orchestrator::ChatOrchestrator;
use crate::quota::QuotaGuard;
use crate::relay::{BufferedRelay, DirectRelay, StreamRelay};
use crate::tasks::TaskGroup;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Dependency container shared by all request handlers
///
/// Built once at startup (or per test) and passed to the router as state.
/// Tests swap in a mock provider and a stub attachment fetcher through the
/// same constructor the binary uses.
pub struct ServerResources {
    pub store: ChatStore,
    pub provider: Arc<dyn CompletionProvider>,
    pub relay: Arc<dyn StreamRelay>,
    pub orchestrator: ChatOrchestrator,
    pub quota: QuotaGuard,
    pub config: Arc<ServerConfig>,
    pub tasks: TaskGroup,
}

impl ServerResources {
    /// Wire the full dependency graph for the given configuration
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: ChatStore,
        provider: Arc<dyn CompletionProvider>,
        fetcher: Arc<dyn AttachmentFetcher>,
    ) -> Self {
        let config = Arc::new(config);
        let tasks = TaskGroup::new();

        let relay: Arc<dyn StreamRelay> = match config.relay_mode {
            RelayMode::Buffered => Arc::new(BufferedRelay::new(tasks.clone())),
            RelayMode::Direct => Arc::new(DirectRelay::new(tasks.clone())),
        };

        let normalizer = Arc::new(AttachmentNormalizer::new(fetcher));
        let tools = Arc::new(ToolRegistry::from_config(&config));
        let orchestrator = ChatOrchestrator::new(
            store.clone(),
            Arc::clone(&provider),
            normalizer,
            tools,
            Arc::clone(&config),
        );
        let quota = QuotaGuard::new(store.clone(), config.daily_request_ceiling);

        Self {
            store,
            provider,
            relay,
            orchestrator,
            quota,
            config,
            tasks,
        }
    }
}
