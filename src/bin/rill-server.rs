// ABOUTME: Server binary entry point for the Rill chat backend
// ABOUTME: Loads configuration, wires resources, serves HTTP with graceful shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use anyhow::Result;
use clap::Parser;
use rill_server::attachments::HttpAttachmentFetcher;
use rill_server::config::ServerConfig;
use rill_server::database::ChatStore;
use rill_server::llm::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use rill_server::resources::ServerResources;
use rill_server::routes;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rill-server")]
#[command(about = "Rill chat backend server")]
struct Args {
    /// HTTP port override (defaults to RILL_HTTP_PORT or 8080)
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::try_parse().unwrap_or_else(|e| {
        // Help and version requests exit here; anything else falls back to
        // environment-driven defaults so container entrypoints stay simple.
        if e.use_stderr() {
            eprintln!("Warning: failed to parse arguments ({e}), using defaults");
            Args { http_port: None }
        } else {
            e.exit()
        }
    });

    rill_server::logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    info!("Starting rill-server: {}", config.summary());
    if config.completion_api_key.is_none() {
        warn!("RILL_COMPLETION_API_KEY is not set; completion requests will be unauthenticated");
    }

    let store = ChatStore::connect(&config.database_url).await?;
    let provider = Arc::new(OpenAiCompatibleProvider::new(
        OpenAiCompatibleConfig::from_server_config(&config),
    )?);
    let fetcher = Arc::new(HttpAttachmentFetcher::new()?);

    let port = config.http_port;
    let resources = Arc::new(ServerResources::new(config, store, provider, fetcher));
    let router = routes::router(Arc::clone(&resources));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Streams started before the shutdown signal keep producing into their
    // buffers; join them so persistence and usage recording finish.
    let active = resources.tasks.active();
    if active > 0 {
        info!("Waiting for {active} in-flight stream task(s)");
    }
    resources.tasks.wait().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
