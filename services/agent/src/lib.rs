//! portsync agent library.
//!
//! The agent runs as a sidecar on every cluster node. It keeps each
//! service's load balancer pointed at whichever task of that service runs on
//! this node, on whatever host port the scheduler assigned it.
//!
//! ## Architecture
//!
//! ```text
//! SyncLoop                      (sleep, read catalog, list node tasks)
//! └── Reconciler                (one service at a time, in catalog order)
//!     ├── LoadBalancerRegistry  (observed state, corrective actions)
//!     └── TaskInventory         (desired state)
//! ```
//!
//! ## Modules
//!
//! - `aws`: ECS, classic ELB and S3 implementations of the collaborators
//! - `mock`: in-memory collaborators for tests and dry runs
//! - `source`: scheme-routed document fetching for configuration and catalog

pub mod aws;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod mock;
pub mod reconciler;
pub mod registry;
pub mod source;
pub mod sync;

// Re-export commonly used types
pub use bootstrap::start;
pub use config::{Config, Configuration};
pub use error::AgentError;
pub use inventory::{ContainerInstance, TaskFilter, TaskInventory};
pub use reconciler::{NodeContext, Reconciler};
pub use registry::LoadBalancerRegistry;
pub use source::{DocumentFetcher, SourceResolver};
pub use sync::{PassStats, SyncLoop};
