//! In-memory collaborators for testing and dry runs.
//!
//! [`MockInventory`] and [`MockRegistry`] hold their state in memory and
//! apply mutations to it, so repeated reconciliation passes observe the
//! effects of earlier ones. [`MemoryFetcher`] serves documents that tests
//! can swap between passes. Every mock can be told to fail a named
//! operation (the trait method name).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use portsync_reconcile::{HealthCheck, Listener, LoadBalancerState, TaskDescription};
use tracing::debug;

use crate::error::AgentError;
use crate::inventory::{ContainerInstance, TaskFilter, TaskInventory};
use crate::registry::LoadBalancerRegistry;
use crate::source::{DocumentFetcher, Location};

#[derive(Debug, Default)]
struct Failures(Mutex<HashSet<&'static str>>);

impl Failures {
    fn insert(&self, operation: &'static str) {
        self.0.lock().unwrap().insert(operation);
    }

    fn remove(&self, operation: &str) {
        self.0.lock().unwrap().remove(operation);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.0.lock().unwrap().contains(operation) {
            anyhow::bail!("[MOCK] {operation} configured to fail");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MockTask {
    container_instance: String,
    family: String,
    description: TaskDescription,
    described: bool,
}

/// In-memory task inventory.
#[derive(Debug, Default)]
pub struct MockInventory {
    container_instances: Mutex<Vec<ContainerInstance>>,
    tasks: Mutex<Vec<MockTask>>,
    failures: Failures,
    describe_calls: AtomicUsize,
}

impl MockInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container instance.
    pub fn add_container_instance(&self, handle: &str, instance_id: &str) {
        self.container_instances
            .lock()
            .unwrap()
            .push(ContainerInstance {
                handle: handle.to_string(),
                instance_id: instance_id.to_string(),
            });
    }

    /// Place a running task of `family` on `container_instance`.
    pub fn add_task(&self, container_instance: &str, family: &str, description: TaskDescription) {
        self.tasks.lock().unwrap().push(MockTask {
            container_instance: container_instance.to_string(),
            family: family.to_string(),
            description,
            described: true,
        });
    }

    /// Stop a task.
    pub fn remove_task(&self, task_id: &str) {
        self.tasks
            .lock()
            .unwrap()
            .retain(|t| t.description.task_id != task_id);
    }

    /// Keep listing a task but leave it out of descriptions, as if it
    /// stopped between the two calls.
    pub fn hide_description(&self, task_id: &str) {
        for task in self.tasks.lock().unwrap().iter_mut() {
            if task.description.task_id == task_id {
                task.described = false;
            }
        }
    }

    /// Make `operation` fail until [`MockInventory::recover`] is called.
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: &str) {
        self.failures.remove(operation);
    }

    /// Number of `describe_tasks` calls made so far.
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskInventory for MockInventory {
    async fn list_container_instances(&self, _cluster: &str) -> Result<Vec<ContainerInstance>> {
        self.failures.check("list_container_instances")?;
        Ok(self.container_instances.lock().unwrap().clone())
    }

    async fn list_tasks(&self, _cluster: &str, filter: &TaskFilter) -> Result<Vec<String>> {
        self.failures.check("list_tasks")?;
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filter.matches(&t.container_instance, &t.family))
            .map(|t| t.description.task_id.clone())
            .collect())
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<TaskDescription>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.check("describe_tasks")?;

        let wanted: HashSet<&str> = task_ids.iter().map(String::as_str).collect();
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.described && wanted.contains(t.description.task_id.as_str()))
            .map(|t| t.description.clone())
            .collect())
    }
}

/// A mutation recorded by [`MockRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Register {
        load_balancer: String,
        instance_id: String,
    },
    Deregister {
        load_balancer: String,
        instance_id: String,
    },
    DeleteListener {
        load_balancer: String,
        balancer_port: i32,
    },
    CreateListener {
        load_balancer: String,
        listener: Listener,
    },
    ConfigureHealthCheck {
        load_balancer: String,
        health_check: HealthCheck,
    },
}

/// In-memory load balancer registry.
#[derive(Debug, Default)]
pub struct MockRegistry {
    balancers: Mutex<BTreeMap<String, LoadBalancerState>>,
    calls: Mutex<Vec<RegistryCall>>,
    failures: Failures,
}

impl MockRegistry {
    /// Create a registry with no load balancers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a load balancer.
    pub fn add_load_balancer(&self, state: LoadBalancerState) {
        self.balancers
            .lock()
            .unwrap()
            .insert(state.name.clone(), state);
    }

    /// Current state of a load balancer.
    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancerState> {
        self.balancers.lock().unwrap().get(name).cloned()
    }

    /// Mutations applied so far, in order.
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Drain the recorded mutations.
    pub fn take_calls(&self) -> Vec<RegistryCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Make `operation` fail until [`MockRegistry::recover`] is called.
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: &str) {
        self.failures.remove(operation);
    }

    fn mutate<F>(&self, name: &str, call: RegistryCall, apply: F) -> Result<()>
    where
        F: FnOnce(&mut LoadBalancerState) -> Result<()>,
    {
        let mut balancers = self.balancers.lock().unwrap();
        let state = balancers
            .get_mut(name)
            .ok_or_else(|| AgentError::LoadBalancerNotFound(name.to_string()))?;
        apply(state)?;

        debug!(call = ?call, "[MOCK] Registry mutation");
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerRegistry for MockRegistry {
    async fn describe_load_balancer(&self, name: &str) -> Result<LoadBalancerState> {
        self.failures.check("describe_load_balancer")?;
        self.load_balancer(name)
            .ok_or_else(|| AgentError::LoadBalancerNotFound(name.to_string()).into())
    }

    async fn register_instance(&self, name: &str, instance_id: &str) -> Result<()> {
        self.failures.check("register_instance")?;
        let call = RegistryCall::Register {
            load_balancer: name.to_string(),
            instance_id: instance_id.to_string(),
        };
        self.mutate(name, call, |state| {
            if !state.is_registered(instance_id) {
                state.registered_instances.push(instance_id.to_string());
            }
            Ok(())
        })
    }

    async fn deregister_instance(&self, name: &str, instance_id: &str) -> Result<()> {
        self.failures.check("deregister_instance")?;
        let call = RegistryCall::Deregister {
            load_balancer: name.to_string(),
            instance_id: instance_id.to_string(),
        };
        self.mutate(name, call, |state| {
            state.registered_instances.retain(|id| id != instance_id);
            Ok(())
        })
    }

    async fn delete_listener(&self, name: &str, balancer_port: i32) -> Result<()> {
        self.failures.check("delete_listener")?;
        let call = RegistryCall::DeleteListener {
            load_balancer: name.to_string(),
            balancer_port,
        };
        self.mutate(name, call, |state| {
            state.listeners.retain(|l| l.balancer_port != balancer_port);
            Ok(())
        })
    }

    async fn create_listener(&self, name: &str, listener: &Listener) -> Result<()> {
        self.failures.check("create_listener")?;
        let call = RegistryCall::CreateListener {
            load_balancer: name.to_string(),
            listener: listener.clone(),
        };
        self.mutate(name, call, |state| {
            if state
                .listeners
                .iter()
                .any(|l| l.balancer_port == listener.balancer_port)
            {
                anyhow::bail!(
                    "[MOCK] listener on port {} already exists",
                    listener.balancer_port
                );
            }
            state.listeners.push(listener.clone());
            Ok(())
        })
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()> {
        self.failures.check("configure_health_check")?;
        let call = RegistryCall::ConfigureHealthCheck {
            load_balancer: name.to_string(),
            health_check: health_check.clone(),
        };
        self.mutate(name, call, |state| {
            state.health_check = Some(health_check.clone());
            Ok(())
        })
    }
}

/// Serves documents from memory, keyed by the full location string.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    failures: Failures,
}

impl MemoryFetcher {
    /// Create a fetcher with no documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the document at `location`.
    pub fn put(&self, location: &str, data: impl Into<Vec<u8>>) {
        self.documents
            .lock()
            .unwrap()
            .insert(location.to_string(), data.into());
    }

    /// Make `fetch` fail until [`MemoryFetcher::recover`] is called.
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: &str) {
        self.failures.remove(operation);
    }
}

#[async_trait]
impl DocumentFetcher for MemoryFetcher {
    async fn fetch(&self, location: &Location) -> Result<Vec<u8>> {
        self.failures.check("fetch")?;
        self.documents
            .lock()
            .unwrap()
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("[MOCK] no document at {location}"))
    }
}
