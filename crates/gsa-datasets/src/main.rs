//! GSA dataset loader - main entry point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use gsa_common::config::shutdown_signal;
use gsa_common::logging::{init_logging, LogConfig};
use gsa_common::notify::notifier_from_env;
use gsa_common::registry::JobRegistry;
use gsa_datasets::config::LoaderConfig;
use gsa_datasets::DatasetLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env("gsa-datasets")?;
    init_logging(&log_config)?;

    info!("Starting GSA dataset loader");

    let config = Arc::new(LoaderConfig::load()?);
    info!(
        example_directory = %config.example_directory.display(),
        "Configuration loaded"
    );

    let board = config.backend.connect_blackboard().await?;
    let broker = config.backend.connect_broker().await?;
    let registry = JobRegistry::new(board, config.backend.status_ttl);
    let notifier = notifier_from_env();

    let loader = DatasetLoader::new(broker, registry, config, notifier);

    tokio::select! {
        _ = loader.run() => {},
        _ = shutdown_signal() => {
            info!("Dataset loader shutting down");
        }
    }

    Ok(())
}
