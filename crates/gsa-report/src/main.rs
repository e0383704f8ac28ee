//! GSA report generator - main entry point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use gsa_common::config::shutdown_signal;
use gsa_common::logging::{init_logging, LogConfig};
use gsa_common::notify::notifier_from_env;
use gsa_common::registry::JobRegistry;
use gsa_report::config::ReportConfig;
use gsa_report::ReportGenerator;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env("gsa-report")?;
    init_logging(&log_config)?;

    info!("Starting GSA report generator");

    let config = Arc::new(ReportConfig::load()?);
    info!(base_url = %config.base_url, "Configuration loaded");

    let board = config.backend.connect_blackboard().await?;
    let broker = config.backend.connect_broker().await?;
    let registry = JobRegistry::new(board, config.backend.status_ttl);
    let notifier = notifier_from_env();

    let generator = ReportGenerator::new(broker, registry, config, notifier);

    tokio::select! {
        _ = generator.run() => {},
        _ = shutdown_signal() => {
            info!("Report generator shutting down");
        }
    }

    Ok(())
}
