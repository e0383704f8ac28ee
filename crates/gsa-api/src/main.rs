//! GSA API - main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use gsa_api::catalog::Catalog;
use gsa_api::config::ApiConfig;
use gsa_api::routes::create_router;
use gsa_api::search::SearchIndex;
use gsa_api::sweeper::StallSweeper;
use gsa_api::ApiState;
use gsa_common::config::shutdown_signal;
use gsa_common::logging::{init_logging, LogConfig};
use gsa_common::notify::notifier_from_env;
use gsa_common::registry::JobRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env("gsa-api")?;
    init_logging(&log_config)?;

    info!("Starting GSA API");

    let config = ApiConfig::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let board = config.backend.connect_blackboard().await?;
    let broker = config.backend.connect_broker().await?;
    let registry = JobRegistry::new(board.clone(), config.backend.status_ttl);

    let catalog = Arc::new(Catalog::load(config.example_directory.as_deref()));
    let search = Arc::new(SearchIndex::build(
        &catalog.examples,
        config.search_whitelist.as_deref(),
        config.search_blacklist.as_deref(),
    ));

    let notifier = notifier_from_env();

    let _sweeper_handle = StallSweeper::new(
        board.clone(),
        registry.clone(),
        notifier,
        config.max_worker_timeout,
        config.loading_max_timeout,
        config.sweep_interval,
    )
    .start();

    let shutdown_timeout = config.server.shutdown_timeout_secs;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = ApiState {
        board,
        broker,
        registry,
        catalog,
        search,
        config: Arc::new(config),
    };
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Give in-flight requests a moment to finish
            tokio::time::sleep(Duration::from_secs(shutdown_timeout.min(5))).await;
        })
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}
