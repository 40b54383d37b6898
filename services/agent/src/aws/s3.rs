//! `s3://bucket/key` document fetcher.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use tracing::debug;

use super::call_failed;
use crate::error::AgentError;
use crate::source::{DocumentFetcher, Location};

/// Reads documents from S3.
pub struct S3Fetcher {
    client: Client,
}

impl S3Fetcher {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

/// Split `bucket/key/with/slashes` into bucket and key.
fn bucket_and_key(location: &Location) -> Result<(&str, &str), AgentError> {
    location
        .rest
        .split_once('/')
        .map(|(bucket, key)| (bucket, key.trim_start_matches('/')))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| AgentError::InvalidLocation(location.to_string()))
}

#[async_trait]
impl DocumentFetcher for S3Fetcher {
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        let (bucket, key) = bucket_and_key(location)?;
        debug!(bucket, key, "Reading object from S3");

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| call_failed("GetObject", e))?;

        let data = output
            .body
            .collect()
            .await
            .context("Failed to read S3 object body")?;

        Ok(data.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_and_key() {
        let location = Location::parse("s3://ops-config/portsync/services.json").unwrap();
        assert_eq!(
            bucket_and_key(&location).unwrap(),
            ("ops-config", "portsync/services.json")
        );

        let leading = Location::parse("s3://ops-config//services.json").unwrap();
        assert_eq!(bucket_and_key(&leading).unwrap(), ("ops-config", "services.json"));
    }

    #[test]
    fn test_bucket_without_key_is_invalid() {
        for raw in ["s3://ops-config", "s3://ops-config/", "s3:///services.json"] {
            let location = Location::parse(raw).unwrap();
            assert!(bucket_and_key(&location).is_err(), "{raw}");
        }
    }
}
