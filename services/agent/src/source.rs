//! Document sources.
//!
//! The configuration document and the service catalog are fetched as raw
//! bytes from a named location. Each location scheme has its own
//! [`DocumentFetcher`], registered with a [`SourceResolver`]:
//!
//! - `file:///etc/portsync/services.json` or a bare path
//! - `http://...` / `https://...`
//! - `s3://bucket/key` (see [`crate::aws::S3Fetcher`])

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use portsync_reconcile::ServiceDescription;
use tracing::debug;

use crate::config::Configuration;
use crate::error::AgentError;

/// A parsed document location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Lowercased scheme; `file` for bare paths.
    pub scheme: String,

    /// Everything after `scheme://`, or the bare path itself.
    pub rest: String,

    raw: String,
}

impl Location {
    /// Parse a location string.
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AgentError::InvalidLocation(raw.to_string()));
        }

        match raw.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() || rest.is_empty() {
                    return Err(AgentError::InvalidLocation(raw.to_string()));
                }
                Ok(Self {
                    scheme: scheme.to_ascii_lowercase(),
                    rest: rest.to_string(),
                    raw: raw.to_string(),
                })
            }
            None => Ok(Self {
                scheme: "file".to_string(),
                rest: raw.to_string(),
                raw: raw.to_string(),
            }),
        }
    }

    /// The location as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Fetches raw document bytes for one location scheme.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>>;
}

/// Reads documents from the local filesystem.
pub struct FileFetcher;

#[async_trait]
impl DocumentFetcher for FileFetcher {
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        tokio::fs::read(&location.rest)
            .await
            .with_context(|| format!("Failed to read {}", location.rest))
    }
}

/// Reads documents over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("portsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        let response = self.client.get(location.as_str()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed (status={}): {}", location, status, body);
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Routes document fetches to the fetcher registered for each scheme.
#[derive(Clone, Default)]
pub struct SourceResolver {
    fetchers: HashMap<String, Arc<dyn DocumentFetcher>>,
}

impl SourceResolver {
    /// Create a resolver with no fetchers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fetcher` for `scheme`, replacing any earlier registration.
    #[must_use]
    pub fn with_fetcher(mut self, scheme: &str, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetchers.insert(scheme.to_ascii_lowercase(), fetcher);
        self
    }

    /// Fetch the raw bytes at `location`.
    pub async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let location = Location::parse(location)?;
        let fetcher =
            self.fetchers
                .get(&location.scheme)
                .ok_or_else(|| AgentError::UnsupportedScheme {
                    scheme: location.scheme.clone(),
                    location: location.to_string(),
                })?;

        debug!(location = %location, "Fetching document");
        let data = fetcher
            .fetch(&location)
            .await
            .with_context(|| format!("Failed to fetch {location}"))?;
        debug!(location = %location, bytes = data.len(), "Fetched document");

        Ok(data)
    }

    /// Fetch and parse the configuration document.
    pub async fn load_configuration(&self, location: &str) -> Result<Configuration> {
        let data = self.fetch(location).await?;
        debug!(
            location,
            content = %String::from_utf8_lossy(&data),
            "Configuration document"
        );
        Configuration::from_slice(&data)
    }

    /// Fetch and parse the service catalog.
    pub async fn load_catalog(&self, location: &str) -> Result<Vec<ServiceDescription>> {
        let data = self.fetch(location).await?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse service catalog at {location}"))
    }
}
