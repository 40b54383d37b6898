//! Process startup.
//!
//! Wires the cloud collaborators together, resolves this node's identity and
//! hands over to the reconciliation loop. Nothing here retries: a failure
//! propagates to `main`, which exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::SdkConfig;
use tracing::info;

use crate::aws::{self, EcsInventory, ElbRegistry, S3Fetcher};
use crate::config::Config;
use crate::identity::{resolve_node_identity, MetadataClient};
use crate::inventory::TaskInventory;
use crate::reconciler::NodeContext;
use crate::registry::LoadBalancerRegistry;
use crate::source::{FileFetcher, HttpFetcher, SourceResolver};
use crate::sync::SyncLoop;

/// Build the document resolver with every built-in scheme.
pub fn default_sources(config: &Config, sdk_config: &SdkConfig) -> Result<SourceResolver> {
    let http = Arc::new(HttpFetcher::new(config.call_timeout)?);

    Ok(SourceResolver::new()
        .with_fetcher("file", Arc::new(FileFetcher))
        .with_fetcher("http", http.clone())
        .with_fetcher("https", http)
        .with_fetcher("s3", Arc::new(S3Fetcher::new(sdk_config))))
}

/// Start the agent. Only returns on failure.
pub async fn start(config: Config) -> Result<()> {
    let sdk_config = aws::load_sdk_config(&config.region, config.call_timeout).await;
    let sources = default_sources(&config, &sdk_config)?;

    let configuration = sources
        .load_configuration(&config.configuration_url)
        .await
        .context("Failed to load configuration")?;
    info!(
        cluster = %configuration.cluster,
        sleep_time_seconds = configuration.sleep_time_seconds,
        "Configuration loaded"
    );

    let inventory: Arc<dyn TaskInventory> = Arc::new(EcsInventory::new(&sdk_config));
    let registry: Arc<dyn LoadBalancerRegistry> = Arc::new(ElbRegistry::new(&sdk_config));

    let metadata = MetadataClient::new(&config.metadata_endpoint, config.call_timeout)?;
    let node = resolve_node_identity(&metadata, inventory.as_ref(), &configuration.cluster)
        .await
        .context("Failed to resolve node identity")?;

    let context = NodeContext {
        cluster: configuration.cluster.clone(),
        node,
    };

    SyncLoop::new(
        context,
        inventory,
        registry,
        sources,
        config.services_url.clone(),
        configuration.sleep_interval(),
    )
    .run()
    .await
}
