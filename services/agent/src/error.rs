//! Error types for the agent.

use portsync_reconcile::ReconcileError;
use thiserror::Error;

/// Named agent failures.
///
/// Collaborator errors are propagated as `anyhow::Error` with context; these
/// variants cover the conditions the agent itself detects.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A required environment variable is unset or empty.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    /// The configuration document parsed but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A document location could not be parsed.
    #[error("invalid document location {0:?}")]
    InvalidLocation(String),

    /// No fetcher is registered for a location's scheme.
    #[error("no fetcher for scheme {scheme:?} (location {location})")]
    UnsupportedScheme { scheme: String, location: String },

    /// This node is not among the cluster's registered container instances.
    #[error("no container instance for {instance_id} in cluster {cluster}")]
    ContainerInstanceNotFound { instance_id: String, cluster: String },

    /// A load balancer named in the catalog does not exist.
    #[error("load balancer {0} not found")]
    LoadBalancerNotFound(String),
}

impl AgentError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AgentError::MissingEnv(_) => "missing_env",
            AgentError::InvalidConfiguration(_) => "invalid_configuration",
            AgentError::InvalidLocation(_) => "invalid_location",
            AgentError::UnsupportedScheme { .. } => "unsupported_scheme",
            AgentError::ContainerInstanceNotFound { .. } => "container_instance_not_found",
            AgentError::LoadBalancerNotFound(_) => "load_balancer_not_found",
        }
    }
}

/// Reason code for a fatal error, looking through any added context.
///
/// Errors raised by collaborators carry no code of their own and report
/// `collaborator_error`.
pub fn reason_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<AgentError>() {
        return e.reason_code();
    }
    if let Some(e) = err.downcast_ref::<ReconcileError>() {
        return e.reason_code();
    }
    "collaborator_error"
}
