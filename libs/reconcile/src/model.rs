//! State model shared by the planner and the agent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::health::HealthCheckTarget;

/// One workload's load balancer binding, as listed in the service catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    /// Task family of the service.
    pub service_name: String,

    /// Load balancer that fronts the service.
    pub load_balancer_name: String,

    /// Container inside the task whose published port receives traffic.
    pub exposed_container_name: String,
}

/// Identity of the node this process runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Cloud instance identifier, as load balancers know the node.
    pub instance_id: String,

    /// The node's registration handle within the cluster.
    pub container_instance: String,
}

/// A container within a described task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescription {
    pub name: String,

    /// Published host ports, in network binding order.
    pub host_ports: Vec<i32>,
}

/// A running task and its containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescription {
    pub task_id: String,
    pub containers: Vec<ContainerDescription>,
}

impl TaskDescription {
    /// Resolve the port binding of the named container.
    ///
    /// Returns `None` when the task has no container by that name.
    pub fn port_binding(&self, container_name: &str) -> Option<TaskPortBinding> {
        self.containers
            .iter()
            .find(|c| c.name == container_name)
            .map(|c| TaskPortBinding {
                task_id: self.task_id.clone(),
                exposed_container_name: c.name.clone(),
                host_port: c.host_ports.first().copied(),
            })
    }
}

/// The host port a task's exposed container is published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPortBinding {
    pub task_id: String,
    pub exposed_container_name: String,

    /// `None` until the container has a published network binding.
    pub host_port: Option<i32>,
}

/// Task descriptions fetched once per pass, keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    tasks: HashMap<String, TaskDescription>,
}

impl TaskIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskDescription> {
        self.tasks.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl FromIterator<TaskDescription> for TaskIndex {
    fn from_iter<I: IntoIterator<Item = TaskDescription>>(iter: I) -> Self {
        Self {
            tasks: iter
                .into_iter()
                .map(|task| (task.task_id.clone(), task))
                .collect(),
        }
    }
}

/// A load balancer listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    /// Port the load balancer accepts traffic on. Identifies the listener.
    pub balancer_port: i32,

    /// Port traffic is forwarded to on registered instances.
    pub instance_port: i32,

    pub protocol: String,
    pub instance_protocol: Option<String>,
    pub ssl_certificate_id: Option<String>,
}

impl Listener {
    /// The same listener forwarding to another instance port.
    #[must_use]
    pub fn with_instance_port(&self, instance_port: i32) -> Self {
        Self {
            instance_port,
            ..self.clone()
        }
    }
}

/// A load balancer health check configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Target string, `PROTOCOL:PORT/PATH` or `PROTOCOL:PORT`.
    pub target: String,
    pub interval: i32,
    pub timeout: i32,
    pub unhealthy_threshold: i32,
    pub healthy_threshold: i32,
}

impl HealthCheck {
    /// Parse the target string.
    pub fn parsed_target(&self) -> Result<HealthCheckTarget, ReconcileError> {
        HealthCheckTarget::parse(&self.target)
    }

    /// The same health check probing another port.
    ///
    /// Thresholds, interval and timeout are carried over unchanged.
    pub fn retarget(&self, port: i32) -> Result<Self, ReconcileError> {
        let target = self.parsed_target()?.with_port(port);
        Ok(Self {
            target: target.to_string(),
            ..self.clone()
        })
    }
}

/// What a load balancer currently looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerState {
    pub name: String,

    /// Instance ids currently registered with the balancer.
    pub registered_instances: Vec<String>,

    /// Listeners in the order the balancer reports them.
    pub listeners: Vec<Listener>,

    pub health_check: Option<HealthCheck>,
}

impl LoadBalancerState {
    /// Returns true if the given instance is registered.
    pub fn is_registered(&self, instance_id: &str) -> bool {
        self.registered_instances.iter().any(|id| id == instance_id)
    }
}
