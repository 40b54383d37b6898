//! Cluster task inventory interface.
//!
//! The inventory answers which container instances make up the cluster,
//! which tasks run on a given container instance (optionally narrowed to one
//! task family), and how those tasks publish their containers' ports.

use anyhow::Result;
use async_trait::async_trait;
use portsync_reconcile::TaskDescription;

/// One registered node in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInstance {
    /// The node's registration handle within the cluster.
    pub handle: String,

    /// Cloud instance identifier of the node.
    pub instance_id: String,
}

/// Narrows a task listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub container_instance: Option<String>,
    pub family: Option<String>,
}

impl TaskFilter {
    /// Tasks placed on the given container instance.
    pub fn on_node(container_instance: &str) -> Self {
        Self {
            container_instance: Some(container_instance.to_string()),
            family: None,
        }
    }

    /// Further restrict to one task family.
    #[must_use]
    pub fn with_family(mut self, family: &str) -> Self {
        self.family = Some(family.to_string());
        self
    }

    /// Returns true if a task with these attributes passes the filter.
    pub fn matches(&self, container_instance: &str, family: &str) -> bool {
        self.container_instance
            .as_deref()
            .is_none_or(|ci| ci == container_instance)
            && self.family.as_deref().is_none_or(|f| f == family)
    }
}

/// Cluster task inventory.
#[async_trait]
pub trait TaskInventory: Send + Sync {
    /// List every container instance registered in the cluster.
    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<ContainerInstance>>;

    /// List the ids of running tasks that pass `filter`.
    async fn list_tasks(&self, cluster: &str, filter: &TaskFilter) -> Result<Vec<String>>;

    /// Describe a batch of tasks. Tasks that no longer exist are omitted.
    async fn describe_tasks(&self, cluster: &str, task_ids: &[String])
        -> Result<Vec<TaskDescription>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_filter_matches() {
        let any = TaskFilter::default();
        assert!(any.matches("ci-1", "web"));

        let node = TaskFilter::on_node("ci-1");
        assert!(node.matches("ci-1", "web"));
        assert!(!node.matches("ci-2", "web"));

        let web = TaskFilter::on_node("ci-1").with_family("web");
        assert!(web.matches("ci-1", "web"));
        assert!(!web.matches("ci-1", "worker"));
        assert!(!web.matches("ci-2", "web"));
    }
}
