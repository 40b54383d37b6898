//! portsync
//!
//! Sidecar that keeps load balancer registration, listener ports and health
//! check targets in line with the tasks running on this node.
//!
//! Configured entirely through the environment:
//! - `CONFIGURATION_URL`: configuration document (cluster, sleep interval)
//! - `SERVICES_URL`: service catalog, re-read every pass
//! - `AWS_REGION`: region of the cluster and load balancers

use anyhow::Result;
use portsync_agent::{error, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing (prefer RUST_LOG, fallback to PORTSYNC_LOG_LEVEL)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| Config::log_level_from_env().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let result = run().await;
    if let Err(e) = &result {
        tracing::error!(
            error = %format!("{e:#}"),
            reason = error::reason_code(e),
            "Agent stopped"
        );
    }

    result
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    info!(
        region = %config.region,
        configuration_url = %config.configuration_url,
        services_url = %config.services_url,
        "Starting portsync agent"
    );

    portsync_agent::start(config).await
}
