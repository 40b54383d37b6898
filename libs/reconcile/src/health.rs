//! Health check target strings.
//!
//! Load balancers persist the health check target as a single string of the
//! form `PROTOCOL:PORT/PATH` (HTTP and HTTPS checks) or `PROTOCOL:PORT` (TCP
//! and SSL checks). The path keeps every `/` after the first one verbatim.

use std::fmt;
use std::str::FromStr;

use crate::error::ReconcileError;

/// A parsed health check target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckTarget {
    pub protocol: String,
    pub port: i32,
    /// Request path including its leading `/`, if the protocol has one.
    pub path: Option<String>,
}

impl HealthCheckTarget {
    /// Parse a target string.
    pub fn parse(target: &str) -> Result<Self, ReconcileError> {
        let invalid = |reason| ReconcileError::InvalidHealthCheckTarget {
            target: target.to_string(),
            reason,
        };

        let (protocol, rest) = target.split_once(':').ok_or(invalid("missing ':'"))?;
        if protocol.is_empty() {
            return Err(invalid("empty protocol"));
        }

        let (port, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("port is not a number"));
        }
        let port = port.parse::<i32>().map_err(|_| invalid("port out of range"))?;

        Ok(Self {
            protocol: protocol.to_string(),
            port,
            path: path.map(str::to_string),
        })
    }

    /// The same target pointed at another port.
    #[must_use]
    pub fn with_port(&self, port: i32) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }
}

impl FromStr for HealthCheckTarget {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HealthCheckTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)?;
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        Ok(())
    }
}
