//! Per-service planning.
//!
//! The planner compares one service's desired state (its single running
//! task on this node and that task's published host port) with the observed
//! state of the service's load balancer, and produces the ordered actions
//! that close the gap:
//!
//! - no task: deregister the node if it is registered
//! - one task with a published port: register if needed, repoint every
//!   listener whose instance port differs, then repoint the health check
//! - anything else: skip the service without touching it

use std::fmt;

use crate::error::ReconcileError;
use crate::model::{HealthCheck, Listener, LoadBalancerState, ServiceDescription, TaskIndex};

/// How many tasks of a service run on this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCardinality<'a> {
    None,
    One(&'a str),
    Many(usize),
}

/// Classify the task ids found for a service on this node.
pub fn classify_tasks(task_ids: &[String]) -> TaskCardinality<'_> {
    match task_ids {
        [] => TaskCardinality::None,
        [only] => TaskCardinality::One(only),
        many => TaskCardinality::Many(many.len()),
    }
}

/// A corrective action against a load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Register this node with the load balancer.
    Register,

    /// Deregister this node from the load balancer.
    Deregister,

    /// Delete `existing` (keyed by its balancer port), then create
    /// `replacement` in its place.
    ReplaceListener {
        existing: Listener,
        replacement: Listener,
    },

    /// Push a health check with a new target.
    ConfigureHealthCheck {
        previous_target: String,
        health_check: HealthCheck,
    },
}

impl Action {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::Deregister => "deregister",
            Action::ReplaceListener { .. } => "replace_listener",
            Action::ConfigureHealthCheck { .. } => "configure_health_check",
        }
    }
}

/// Why a service was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// More than one task of the service runs on this node.
    MultipleTasks { count: usize },

    /// The task stopped between listing and describing.
    TaskNotDescribed { task_id: String },

    /// The task has no container with the exposed name.
    ContainerNotFound { container: String },

    /// The container has no published network binding yet.
    NoPublishedPort { container: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MultipleTasks { count } => {
                write!(f, "expected exactly 1 running task, found {count}")
            }
            SkipReason::TaskNotDescribed { task_id } => {
                write!(f, "no description for task {task_id}")
            }
            SkipReason::ContainerNotFound { container } => {
                write!(f, "task has no container named {container}")
            }
            SkipReason::NoPublishedPort { container } => {
                write!(f, "container {container} has no network binding")
            }
        }
    }
}

/// Outcome of planning one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicePlan {
    /// Observed state already matches desired state.
    Converged,

    /// The service is in a state that is not acted on this pass.
    Skip(SkipReason),

    /// Actions to apply, in order.
    Apply(Vec<Action>),
}

impl ServicePlan {
    fn from_actions(actions: Vec<Action>) -> Self {
        if actions.is_empty() {
            Self::Converged
        } else {
            Self::Apply(actions)
        }
    }

    /// Actions to apply, empty unless this is [`ServicePlan::Apply`].
    pub fn actions(&self) -> &[Action] {
        match self {
            Self::Apply(actions) => actions,
            _ => &[],
        }
    }

    /// Returns true if nothing needs to change.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Replacement actions for every listener not forwarding to `host_port`.
pub fn listener_replacements(listeners: &[Listener], host_port: i32) -> Vec<Action> {
    listeners
        .iter()
        .filter(|listener| listener.instance_port != host_port)
        .map(|listener| Action::ReplaceListener {
            existing: listener.clone(),
            replacement: listener.with_instance_port(host_port),
        })
        .collect()
}

/// Plan one service against its load balancer.
///
/// `service_tasks` are the ids of this service's tasks running on the node;
/// `tasks` holds the descriptions fetched for the node earlier in the pass.
pub fn plan_service(
    service: &ServiceDescription,
    instance_id: &str,
    load_balancer: &LoadBalancerState,
    service_tasks: &[String],
    tasks: &TaskIndex,
) -> Result<ServicePlan, ReconcileError> {
    let registered = load_balancer.is_registered(instance_id);

    let task_id = match classify_tasks(service_tasks) {
        TaskCardinality::None => {
            let actions = if registered {
                vec![Action::Deregister]
            } else {
                Vec::new()
            };
            return Ok(ServicePlan::from_actions(actions));
        }
        TaskCardinality::Many(count) => {
            return Ok(ServicePlan::Skip(SkipReason::MultipleTasks { count }));
        }
        TaskCardinality::One(task_id) => task_id,
    };

    let Some(task) = tasks.get(task_id) else {
        return Ok(ServicePlan::Skip(SkipReason::TaskNotDescribed {
            task_id: task_id.to_string(),
        }));
    };

    let container = &service.exposed_container_name;
    let Some(binding) = task.port_binding(container) else {
        return Ok(ServicePlan::Skip(SkipReason::ContainerNotFound {
            container: container.clone(),
        }));
    };
    let Some(host_port) = binding.host_port else {
        return Ok(ServicePlan::Skip(SkipReason::NoPublishedPort {
            container: container.clone(),
        }));
    };

    let mut actions = Vec::new();
    if !registered {
        actions.push(Action::Register);
    }

    actions.extend(listener_replacements(&load_balancer.listeners, host_port));

    if let Some(check) = &load_balancer.health_check {
        if check.parsed_target()?.port != host_port {
            actions.push(Action::ConfigureHealthCheck {
                previous_target: check.target.clone(),
                health_check: check.retarget(host_port)?,
            });
        }
    }

    Ok(ServicePlan::from_actions(actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerDescription, TaskDescription};

    const NODE: &str = "i-0123456789abcdef0";

    fn web_service() -> ServiceDescription {
        ServiceDescription {
            service_name: "web".to_string(),
            load_balancer_name: "web-lb".to_string(),
            exposed_container_name: "app".to_string(),
        }
    }

    fn https_listener(instance_port: i32) -> Listener {
        Listener {
            balancer_port: 443,
            instance_port,
            protocol: "HTTPS".to_string(),
            instance_protocol: Some("HTTP".to_string()),
            ssl_certificate_id: Some("arn:aws:iam::123456789012:server-certificate/web".to_string()),
        }
    }

    fn health_check(target: &str) -> HealthCheck {
        HealthCheck {
            target: target.to_string(),
            interval: 30,
            timeout: 5,
            unhealthy_threshold: 2,
            healthy_threshold: 10,
        }
    }

    fn load_balancer(registered: bool, instance_port: i32) -> LoadBalancerState {
        LoadBalancerState {
            name: "web-lb".to_string(),
            registered_instances: if registered {
                vec![NODE.to_string()]
            } else {
                vec!["i-someoneelse".to_string()]
            },
            listeners: vec![https_listener(instance_port)],
            health_check: Some(health_check(&format!("HTTPS:{instance_port}/status"))),
        }
    }

    fn task_index(host_ports: Vec<i32>) -> TaskIndex {
        vec![TaskDescription {
            task_id: "task-1".to_string(),
            containers: vec![ContainerDescription {
                name: "app".to_string(),
                host_ports,
            }],
        }]
        .into_iter()
        .collect()
    }

    fn one_task() -> Vec<String> {
        vec!["task-1".to_string()]
    }

    #[test]
    fn test_classify_tasks() {
        assert_eq!(classify_tasks(&[]), TaskCardinality::None);
        assert_eq!(classify_tasks(&one_task()), TaskCardinality::One("task-1"));
        let two = vec!["a".to_string(), "b".to_string()];
        assert_eq!(classify_tasks(&two), TaskCardinality::Many(2));
    }

    #[test]
    fn test_no_task_deregisters_registered_node() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(true, 8080),
            &[],
            &TaskIndex::new(),
        )
        .unwrap();
        assert_eq!(plan, ServicePlan::Apply(vec![Action::Deregister]));
    }

    #[test]
    fn test_no_task_and_not_registered_is_converged() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(false, 8080),
            &[],
            &TaskIndex::new(),
        )
        .unwrap();
        assert!(plan.is_converged());
    }

    #[test]
    fn test_multiple_tasks_are_skipped_even_when_registered() {
        let tasks = vec!["task-1".to_string(), "task-2".to_string()];
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(true, 8080),
            &tasks,
            &task_index(vec![31000]),
        )
        .unwrap();
        assert_eq!(plan, ServicePlan::Skip(SkipReason::MultipleTasks { count: 2 }));
        assert!(plan.actions().is_empty());
    }

    #[test]
    fn test_undescribed_task_is_skipped() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(false, 8080),
            &["task-9".to_string()],
            &task_index(vec![31000]),
        )
        .unwrap();
        assert_eq!(
            plan,
            ServicePlan::Skip(SkipReason::TaskNotDescribed {
                task_id: "task-9".to_string()
            })
        );
    }

    #[test]
    fn test_missing_container_is_skipped() {
        let mut service = web_service();
        service.exposed_container_name = "proxy".to_string();
        let plan = plan_service(
            &service,
            NODE,
            &load_balancer(false, 8080),
            &one_task(),
            &task_index(vec![31000]),
        )
        .unwrap();
        assert_eq!(
            plan,
            ServicePlan::Skip(SkipReason::ContainerNotFound {
                container: "proxy".to_string()
            })
        );
    }

    #[test]
    fn test_unpublished_container_is_skipped() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(false, 8080),
            &one_task(),
            &task_index(vec![]),
        )
        .unwrap();
        assert_eq!(
            plan,
            ServicePlan::Skip(SkipReason::NoPublishedPort {
                container: "app".to_string()
            })
        );
    }

    #[test]
    fn test_new_task_registers_and_repoints() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(false, 0),
            &one_task(),
            &task_index(vec![31000, 31001]),
        )
        .unwrap();

        assert_eq!(
            plan,
            ServicePlan::Apply(vec![
                Action::Register,
                Action::ReplaceListener {
                    existing: https_listener(0),
                    replacement: https_listener(31000),
                },
                Action::ConfigureHealthCheck {
                    previous_target: "HTTPS:0/status".to_string(),
                    health_check: health_check("HTTPS:31000/status"),
                },
            ])
        );
    }

    #[test]
    fn test_registered_node_with_moved_port_is_not_reregistered() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(true, 30000),
            &one_task(),
            &task_index(vec![31000]),
        )
        .unwrap();

        let names: Vec<_> = plan.actions().iter().map(Action::name).collect();
        assert_eq!(names, vec!["replace_listener", "configure_health_check"]);
    }

    #[test]
    fn test_steady_state_is_converged() {
        let plan = plan_service(
            &web_service(),
            NODE,
            &load_balancer(true, 31000),
            &one_task(),
            &task_index(vec![31000]),
        )
        .unwrap();
        assert!(plan.is_converged());
    }

    #[test]
    fn test_only_mismatched_listeners_are_replaced() {
        let http = Listener {
            balancer_port: 80,
            instance_port: 31000,
            protocol: "HTTP".to_string(),
            instance_protocol: Some("HTTP".to_string()),
            ssl_certificate_id: None,
        };
        let listeners = vec![http, https_listener(8080)];

        let actions = listener_replacements(&listeners, 31000);
        assert_eq!(
            actions,
            vec![Action::ReplaceListener {
                existing: https_listener(8080),
                replacement: https_listener(31000),
            }]
        );
    }

    #[test]
    fn test_malformed_health_check_target_is_an_error() {
        let mut lb = load_balancer(true, 8080);
        lb.health_check = Some(health_check("not-a-target"));

        let err = plan_service(
            &web_service(),
            NODE,
            &lb,
            &one_task(),
            &task_index(vec![31000]),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidHealthCheckTarget { .. }));
    }

    #[test]
    fn test_balancer_without_health_check() {
        let mut lb = load_balancer(true, 8080);
        lb.health_check = None;

        let plan = plan_service(
            &web_service(),
            NODE,
            &lb,
            &one_task(),
            &task_index(vec![31000]),
        )
        .unwrap();
        let names: Vec<_> = plan.actions().iter().map(Action::name).collect();
        assert_eq!(names, vec!["replace_listener"]);
    }
}
