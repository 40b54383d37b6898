//! Per-service reconciliation.
//!
//! For one service the reconciler:
//! - Describes the service's load balancer
//! - Lists the service's tasks running on this node
//! - Plans the corrective actions (see [`portsync_reconcile::plan_service`])
//! - Applies them in order, stopping at the first failure
//!
//! Collaborator errors are returned to the caller untouched apart from
//! context; there is no retry here.

use std::sync::Arc;

use anyhow::{Context, Result};
use portsync_reconcile::{
    plan_service, Action, NodeIdentity, ServiceDescription, ServicePlan, TaskIndex,
};
use tracing::{debug, error, info, warn};

use crate::inventory::{TaskFilter, TaskInventory};
use crate::registry::LoadBalancerRegistry;

/// Immutable per-process context, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    /// Cluster the node is registered in.
    pub cluster: String,

    /// This node's identity.
    pub node: NodeIdentity,
}

/// Reconciles one service at a time against its load balancer.
pub struct Reconciler {
    context: NodeContext,
    inventory: Arc<dyn TaskInventory>,
    registry: Arc<dyn LoadBalancerRegistry>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        context: NodeContext,
        inventory: Arc<dyn TaskInventory>,
        registry: Arc<dyn LoadBalancerRegistry>,
    ) -> Self {
        Self {
            context,
            inventory,
            registry,
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    /// Reconcile one service and return the plan that was applied.
    ///
    /// `tasks` holds the descriptions of every task on this node, fetched
    /// once for the whole pass.
    pub async fn reconcile_service(
        &self,
        service: &ServiceDescription,
        tasks: &TaskIndex,
    ) -> Result<ServicePlan> {
        let load_balancer = self
            .registry
            .describe_load_balancer(&service.load_balancer_name)
            .await
            .with_context(|| {
                format!(
                    "Failed to describe load balancer {}",
                    service.load_balancer_name
                )
            })?;

        let filter = TaskFilter::on_node(&self.context.node.container_instance)
            .with_family(&service.service_name);
        let service_tasks = self
            .inventory
            .list_tasks(&self.context.cluster, &filter)
            .await
            .with_context(|| format!("Failed to list tasks for {}", service.service_name))?;

        debug!(
            service = %service.service_name,
            registered = load_balancer.is_registered(&self.context.node.instance_id),
            task_count = service_tasks.len(),
            listener_count = load_balancer.listeners.len(),
            "Observed service state"
        );

        let plan = plan_service(
            service,
            &self.context.node.instance_id,
            &load_balancer,
            &service_tasks,
            tasks,
        )?;

        match &plan {
            ServicePlan::Converged => {
                debug!(service = %service.service_name, "Service converged");
            }
            ServicePlan::Skip(reason) => {
                warn!(
                    service = %service.service_name,
                    reason = %reason,
                    "Skipping service"
                );
            }
            ServicePlan::Apply(actions) => {
                for action in actions {
                    self.apply(service, action).await?;
                }
            }
        }

        Ok(plan)
    }

    async fn apply(&self, service: &ServiceDescription, action: &Action) -> Result<()> {
        let load_balancer = service.load_balancer_name.as_str();
        let instance_id = self.context.node.instance_id.as_str();

        match action {
            Action::Register => {
                info!(
                    service = %service.service_name,
                    load_balancer,
                    instance_id,
                    "Registering instance with load balancer"
                );
                self.registry
                    .register_instance(load_balancer, instance_id)
                    .await
                    .with_context(|| format!("Failed to register with {load_balancer}"))?;
            }
            Action::Deregister => {
                info!(
                    service = %service.service_name,
                    load_balancer,
                    instance_id,
                    "Deregistering instance from load balancer"
                );
                self.registry
                    .deregister_instance(load_balancer, instance_id)
                    .await
                    .with_context(|| format!("Failed to deregister from {load_balancer}"))?;
            }
            Action::ReplaceListener {
                existing,
                replacement,
            } => {
                info!(
                    service = %service.service_name,
                    load_balancer,
                    balancer_port = existing.balancer_port,
                    from_instance_port = existing.instance_port,
                    to_instance_port = replacement.instance_port,
                    "Replacing load balancer listener"
                );
                self.registry
                    .delete_listener(load_balancer, existing.balancer_port)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to delete listener {} on {load_balancer}",
                            existing.balancer_port
                        )
                    })?;

                if let Err(e) = self.registry.create_listener(load_balancer, replacement).await {
                    error!(
                        load_balancer,
                        balancer_port = replacement.balancer_port,
                        instance_port = replacement.instance_port,
                        protocol = %replacement.protocol,
                        instance_protocol = ?replacement.instance_protocol,
                        ssl_certificate_id = ?replacement.ssl_certificate_id,
                        "Listener deleted but not recreated"
                    );
                    return Err(e.context(format!(
                        "Failed to create listener {} on {load_balancer}",
                        replacement.balancer_port
                    )));
                }
            }
            Action::ConfigureHealthCheck {
                previous_target,
                health_check,
            } => {
                info!(
                    service = %service.service_name,
                    load_balancer,
                    from_target = %previous_target,
                    to_target = %health_check.target,
                    "Updating load balancer health check"
                );
                self.registry
                    .configure_health_check(load_balancer, health_check)
                    .await
                    .with_context(|| {
                        format!("Failed to configure health check on {load_balancer}")
                    })?;
            }
        }

        Ok(())
    }
}
