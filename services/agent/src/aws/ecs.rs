//! Task inventory over the ECS API.

use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecs::types::Task;
use aws_sdk_ecs::Client;
use portsync_reconcile::{ContainerDescription, TaskDescription};
use tracing::{debug, warn};

use super::call_failed;
use crate::inventory::{ContainerInstance, TaskFilter, TaskInventory};

/// Maximum ids per describe call.
const DESCRIBE_BATCH_SIZE: usize = 100;

/// ECS-backed task inventory.
pub struct EcsInventory {
    client: Client,
}

impl EcsInventory {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    async fn list_container_instance_arns(&self, cluster: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_container_instances()
                .cluster(cluster)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| call_failed("ListContainerInstances", e))?;

            arns.extend(output.container_instance_arns().iter().cloned());

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(arns)
    }
}

fn task_description(task: &Task) -> Option<TaskDescription> {
    let task_id = task.task_arn()?.to_string();
    let containers = task
        .containers()
        .iter()
        .filter_map(|container| {
            Some(ContainerDescription {
                name: container.name()?.to_string(),
                host_ports: container
                    .network_bindings()
                    .iter()
                    .filter_map(|binding| binding.host_port())
                    .collect(),
            })
        })
        .collect();

    Some(TaskDescription {
        task_id,
        containers,
    })
}

#[async_trait]
impl TaskInventory for EcsInventory {
    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<ContainerInstance>> {
        let arns = self.list_container_instance_arns(cluster).await?;
        let mut instances = Vec::with_capacity(arns.len());

        for chunk in arns.chunks(DESCRIBE_BATCH_SIZE) {
            let output = self
                .client
                .describe_container_instances()
                .cluster(cluster)
                .set_container_instances(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| call_failed("DescribeContainerInstances", e))?;

            for ci in output.container_instances() {
                if let (Some(handle), Some(instance_id)) =
                    (ci.container_instance_arn(), ci.ec2_instance_id())
                {
                    instances.push(ContainerInstance {
                        handle: handle.to_string(),
                        instance_id: instance_id.to_string(),
                    });
                }
            }
        }

        Ok(instances)
    }

    async fn list_tasks(&self, cluster: &str, filter: &TaskFilter) -> Result<Vec<String>> {
        let mut task_ids = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_tasks()
                .cluster(cluster)
                .set_container_instance(filter.container_instance.clone())
                .set_family(filter.family.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| call_failed("ListTasks", e))?;

            task_ids.extend(output.task_arns().iter().cloned());

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(
            cluster,
            family = ?filter.family,
            task_count = task_ids.len(),
            "Listed tasks"
        );
        Ok(task_ids)
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<TaskDescription>> {
        let mut tasks = Vec::with_capacity(task_ids.len());

        for chunk in task_ids.chunks(DESCRIBE_BATCH_SIZE) {
            let output = self
                .client
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| call_failed("DescribeTasks", e))?;

            for failure in output.failures() {
                warn!(
                    arn = ?failure.arn(),
                    reason = ?failure.reason(),
                    "Task could not be described"
                );
            }

            tasks.extend(output.tasks().iter().filter_map(task_description));
        }

        Ok(tasks)
    }
}
