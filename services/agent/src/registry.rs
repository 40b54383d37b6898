//! Load balancer registry interface.

use anyhow::Result;
use async_trait::async_trait;
use portsync_reconcile::{HealthCheck, Listener, LoadBalancerState};

/// Load balancer administration.
///
/// Listeners cannot be modified in place; changing a listener's instance
/// port means deleting it and creating a replacement.
#[async_trait]
pub trait LoadBalancerRegistry: Send + Sync {
    /// Describe registered instances, listeners and health check.
    async fn describe_load_balancer(&self, name: &str) -> Result<LoadBalancerState>;

    /// Register an instance. Registering an already registered instance is a no-op.
    async fn register_instance(&self, name: &str, instance_id: &str) -> Result<()>;

    /// Deregister an instance.
    async fn deregister_instance(&self, name: &str, instance_id: &str) -> Result<()>;

    /// Delete the listener on `balancer_port`.
    async fn delete_listener(&self, name: &str, balancer_port: i32) -> Result<()>;

    /// Create a listener.
    async fn create_listener(&self, name: &str, listener: &Listener) -> Result<()>;

    /// Replace the health check configuration.
    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()>;
}
