//! Configuration for the agent.
//!
//! Two layers:
//! - [`Config`]: process settings read from environment variables
//! - [`Configuration`]: the configuration document `CONFIGURATION_URL` points at

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::AgentError;

/// Default base URL of the instance metadata service.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254";

/// Log level used when neither `RUST_LOG` nor `PORTSYNC_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default timeout applied to every outbound call.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Agent process configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the configuration document.
    pub configuration_url: String,

    /// Location of the service catalog document.
    pub services_url: String,

    /// Cloud region the cluster and load balancers live in.
    pub region: String,

    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Base URL of the instance metadata service.
    pub metadata_endpoint: String,

    /// Timeout for each outbound call.
    pub call_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Log level from the environment alone.
    ///
    /// Available before the rest of the configuration is validated, so
    /// logging can be set up first.
    pub fn log_level_from_env() -> String {
        log_level(&|key: &str| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(AgentError::MissingEnv(key))
        };

        let configuration_url = required("CONFIGURATION_URL")?;
        let services_url = required("SERVICES_URL")?;
        let region = required("AWS_REGION")?;

        let log_level = log_level(&lookup);

        let metadata_endpoint = lookup("PORTSYNC_METADATA_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_METADATA_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        let call_timeout_secs: u64 = lookup("PORTSYNC_CALL_TIMEOUT_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("PORTSYNC_CALL_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS)
            .max(1);

        Ok(Self {
            configuration_url,
            services_url,
            region,
            log_level,
            metadata_endpoint,
            call_timeout: Duration::from_secs(call_timeout_secs),
        })
    }
}

fn log_level<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("PORTSYNC_LOG_LEVEL")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// The configuration document.
///
/// Loaded once at startup; only the service catalog is re-read each pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Cluster the node is registered in.
    pub cluster: String,

    /// Seconds to sleep before each reconciliation pass.
    pub sleep_time_seconds: u64,
}

impl Configuration {
    /// Parse and validate a configuration document.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let config: Self =
            serde_json::from_slice(data).context("Failed to parse configuration document")?;

        if config.cluster.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration("cluster must not be empty".into()).into());
        }
        if config.sleep_time_seconds == 0 {
            return Err(AgentError::InvalidConfiguration(
                "sleepTimeSeconds must be greater than zero".into(),
            )
            .into());
        }

        Ok(config)
    }

    /// Interval between reconciliation passes.
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_time_seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required_env() -> HashMap<String, String> {
        env(&[
            ("CONFIGURATION_URL", "s3://ops-config/portsync/config.json"),
            ("SERVICES_URL", "s3://ops-config/portsync/services.json"),
            ("AWS_REGION", "eu-west-1"),
        ])
    }

    #[test]
    fn test_config_defaults() {
        let vars = required_env();
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.configuration_url, "s3://ops-config/portsync/config.json");
        assert_eq!(config.services_url, "s3://ops-config/portsync/services.json");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.metadata_endpoint, DEFAULT_METADATA_ENDPOINT);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_log_level_without_required_vars() {
        let vars = env(&[("PORTSYNC_LOG_LEVEL", "warn")]);
        assert_eq!(log_level(&|k: &str| vars.get(k).cloned()), "warn");

        let empty = env(&[]);
        assert_eq!(log_level(&|k: &str| empty.get(k).cloned()), DEFAULT_LOG_LEVEL);
        assert!(Config::from_lookup(|k| empty.get(k).cloned()).is_err());
    }

    #[test]
    fn test_config_overrides() {
        let mut vars = required_env();
        vars.insert("PORTSYNC_LOG_LEVEL".into(), "debug".into());
        vars.insert("PORTSYNC_METADATA_ENDPOINT".into(), "http://127.0.0.1:1338/".into());
        vars.insert("PORTSYNC_CALL_TIMEOUT_SECS".into(), "5".into());

        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.metadata_endpoint, "http://127.0.0.1:1338");
        assert_eq!(config.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_missing_required_variable() {
        let mut vars = required_env();
        vars.remove("SERVICES_URL");

        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("SERVICES_URL"));
    }

    #[test]
    fn test_config_rejects_malformed_timeout() {
        let mut vars = required_env();
        vars.insert("PORTSYNC_CALL_TIMEOUT_SECS".into(), "soon".into());

        assert!(Config::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_configuration_document() {
        let json = br#"{"cluster": "production", "sleepTimeSeconds": 15}"#;
        let config = Configuration::from_slice(json).unwrap();
        assert_eq!(config.cluster, "production");
        assert_eq!(config.sleep_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_configuration_document_tolerates_legacy_keys() {
        let json = br#"{
            "region": "eu-west-1",
            "cluster": "production",
            "serviceDescriptionFilename": "services.json",
            "sleepTimeSeconds": 10
        }"#;
        let config = Configuration::from_slice(json).unwrap();
        assert_eq!(config.sleep_time_seconds, 10);
    }

    #[test]
    fn test_configuration_document_validation() {
        assert!(Configuration::from_slice(br#"{"cluster": "", "sleepTimeSeconds": 10}"#).is_err());
        assert!(Configuration::from_slice(br#"{"cluster": "c", "sleepTimeSeconds": 0}"#).is_err());
        assert!(Configuration::from_slice(br#"{"cluster": "c", "sleepTimeSeconds": -5}"#).is_err());
        assert!(Configuration::from_slice(b"not json").is_err());
    }
}
