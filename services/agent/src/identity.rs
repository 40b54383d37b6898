//! Node identity.
//!
//! The node learns its own instance id from the instance metadata service,
//! then finds its container instance handle by matching that id against the
//! cluster's listing of registered container instances. Both happen once at
//! startup; failing either is fatal.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use portsync_reconcile::NodeIdentity;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::inventory::TaskInventory;

const TOKEN_PATH: &str = "/latest/api/token";
const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_TTL_SECS: &str = "21600";

/// Upper bound on the session token request.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(2);

/// Source of the node's own instance id.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    async fn instance_id(&self) -> Result<String>;
}

/// Instance metadata service client.
pub struct MetadataClient {
    client: reqwest::Client,
    endpoint: String,
    token_timeout: Duration,
}

impl MetadataClient {
    /// Create a client for the metadata service at `endpoint`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build metadata HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token_timeout: DEFAULT_TOKEN_TIMEOUT.min(timeout),
        })
    }

    /// Bound the session token request separately from other calls.
    #[must_use]
    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    /// Request a session token.
    ///
    /// Returns `None` when the service does not hand out tokens, or the
    /// token response never arrives (a container behind a one-hop limit),
    /// in which case requests are made without one.
    async fn session_token(&self) -> Result<Option<String>> {
        let url = format!("{}{}", self.endpoint, TOKEN_PATH);
        let response = match self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .timeout(self.token_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    error = %e,
                    "Metadata session token request failed, continuing without one"
                );
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            debug!(
                status = %response.status(),
                "Metadata session token unavailable, continuing without one"
            );
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl InstanceMetadata for MetadataClient {
    async fn instance_id(&self) -> Result<String> {
        let token = self.session_token().await?;

        let url = format!("{}{}", self.endpoint, INSTANCE_ID_PATH);
        let mut request = self.client.get(&url);
        if let Some(token) = &token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("instance id lookup failed (status={}): {}", status, body);
        }

        let instance_id = response.text().await?.trim().to_string();
        if instance_id.is_empty() {
            anyhow::bail!("metadata service returned an empty instance id");
        }

        Ok(instance_id)
    }
}

/// Resolve this node's identity within `cluster`.
pub async fn resolve_node_identity(
    metadata: &dyn InstanceMetadata,
    inventory: &dyn TaskInventory,
    cluster: &str,
) -> Result<NodeIdentity> {
    let instance_id = metadata
        .instance_id()
        .await
        .context("Failed to read instance id from the metadata service")?;
    info!(instance_id = %instance_id, "Resolved instance id");

    let container_instances = inventory
        .list_container_instances(cluster)
        .await
        .context("Failed to list container instances")?;
    debug!(
        cluster,
        container_instance_count = container_instances.len(),
        "Listed container instances"
    );

    let container_instance = container_instances
        .into_iter()
        .find(|ci| ci.instance_id == instance_id)
        .map(|ci| ci.handle)
        .ok_or_else(|| AgentError::ContainerInstanceNotFound {
            instance_id: instance_id.clone(),
            cluster: cluster.to_string(),
        })?;
    info!(
        instance_id = %instance_id,
        container_instance = %container_instance,
        "Resolved container instance"
    );

    Ok(NodeIdentity {
        instance_id,
        container_instance,
    })
}
