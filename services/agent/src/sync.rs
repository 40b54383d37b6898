//! The reconciliation loop.
//!
//! Each pass:
//! 1. Sleeps for the configured interval (also before the very first pass)
//! 2. Re-reads the service catalog
//! 3. Lists the tasks running on this node and describes them in one batch
//! 4. Reconciles every service in catalog order
//!
//! Any error ends the loop. Services are not isolated from each other: one
//! failing service stops the pass, and the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use portsync_reconcile::{Action, ServicePlan, TaskIndex};
use tracing::{debug, info};

use crate::inventory::{TaskFilter, TaskInventory};
use crate::reconciler::{NodeContext, Reconciler};
use crate::registry::LoadBalancerRegistry;
use crate::source::SourceResolver;

/// Counters for one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub services_considered: u32,
    pub services_skipped: u32,
    pub registrations: u32,
    pub deregistrations: u32,
    pub listeners_replaced: u32,
    pub health_checks_updated: u32,
}

impl PassStats {
    fn record(&mut self, plan: &ServicePlan) {
        self.services_considered += 1;
        if let ServicePlan::Skip(_) = plan {
            self.services_skipped += 1;
        }

        for action in plan.actions() {
            match action {
                Action::Register => self.registrations += 1,
                Action::Deregister => self.deregistrations += 1,
                Action::ReplaceListener { .. } => self.listeners_replaced += 1,
                Action::ConfigureHealthCheck { .. } => self.health_checks_updated += 1,
            }
        }
    }

    /// Returns true if the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.registrations == 0
            && self.deregistrations == 0
            && self.listeners_replaced == 0
            && self.health_checks_updated == 0
    }
}

/// Drives the reconciler over the service catalog on a fixed interval.
pub struct SyncLoop {
    reconciler: Reconciler,
    inventory: Arc<dyn TaskInventory>,
    sources: SourceResolver,
    services_url: String,
    interval: Duration,
}

impl SyncLoop {
    /// Create a new loop.
    pub fn new(
        context: NodeContext,
        inventory: Arc<dyn TaskInventory>,
        registry: Arc<dyn LoadBalancerRegistry>,
        sources: SourceResolver,
        services_url: String,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(context, Arc::clone(&inventory), registry),
            inventory,
            sources,
            services_url,
            interval,
        }
    }

    /// Run passes until one fails.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            services_url = %self.services_url,
            "Starting reconciliation loop"
        );

        loop {
            debug!(interval_secs = self.interval.as_secs(), "Sleeping before next pass");
            tokio::time::sleep(self.interval).await;

            self.run_pass().await?;
        }
    }

    /// Perform a single reconciliation pass.
    pub async fn run_pass(&self) -> Result<PassStats> {
        let context = self.reconciler.context();

        let services = self
            .sources
            .load_catalog(&self.services_url)
            .await
            .context("Failed to load service catalog")?;

        let node_tasks = self
            .inventory
            .list_tasks(
                &context.cluster,
                &TaskFilter::on_node(&context.node.container_instance),
            )
            .await
            .context("Failed to list tasks on this node")?;

        let tasks: TaskIndex = if node_tasks.is_empty() {
            info!("No tasks running on this node");
            TaskIndex::new()
        } else {
            debug!(task_count = node_tasks.len(), "Describing node tasks");
            self.inventory
                .describe_tasks(&context.cluster, &node_tasks)
                .await
                .context("Failed to describe node tasks")?
                .into_iter()
                .collect()
        };

        let mut stats = PassStats::default();
        for service in &services {
            info!(
                service = %service.service_name,
                load_balancer = %service.load_balancer_name,
                container = %service.exposed_container_name,
                "Considering service"
            );

            let plan = self
                .reconciler
                .reconcile_service(service, &tasks)
                .await
                .with_context(|| format!("Failed to reconcile service {}", service.service_name))?;
            stats.record(&plan);
        }

        info!(
            services_considered = stats.services_considered,
            services_skipped = stats.services_skipped,
            registrations = stats.registrations,
            deregistrations = stats.deregistrations,
            listeners_replaced = stats.listeners_replaced,
            health_checks_updated = stats.health_checks_updated,
            "Reconciliation pass complete"
        );

        Ok(stats)
    }
}
