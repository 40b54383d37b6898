//! Error types for reconciliation planning.

use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The load balancer's health check target could not be parsed.
    #[error("invalid health check target {target:?}: {reason}")]
    InvalidHealthCheckTarget { target: String, reason: &'static str },
}

impl ReconcileError {
    /// Get the short reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ReconcileError::InvalidHealthCheckTarget { .. } => "invalid_health_check_target",
        }
    }
}
