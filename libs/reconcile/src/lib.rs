//! Load balancer reconciliation primitives.
//!
//! This library holds the I/O-free half of the node sidecar: the state
//! model and the decision logic that turns observed state into corrective
//! actions. Key concepts:
//!
//! - **Desired state**: whether a task of the service runs on this node, and
//!   on which published host port.
//! - **Observed state**: whether this node is registered with the service's
//!   load balancer, and where its listeners and health check point.
//! - **Plan**: the ordered, minimal list of actions that makes the two agree.
//!
//! # Invariants
//!
//! - Planning is deterministic given the same inputs
//! - Applying a plan and planning again against the result yields
//!   [`ServicePlan::Converged`]
//! - At most one task per service per node is ever acted on; more than one
//!   is skipped without changes

mod error;
mod health;
mod model;
mod plan;

pub use error::ReconcileError;
pub use health::HealthCheckTarget;
pub use model::{
    ContainerDescription, HealthCheck, Listener, LoadBalancerState, NodeIdentity,
    ServiceDescription, TaskDescription, TaskIndex, TaskPortBinding,
};
pub use plan::{
    classify_tasks, listener_replacements, plan_service, Action, ServicePlan, SkipReason,
    TaskCardinality,
};
