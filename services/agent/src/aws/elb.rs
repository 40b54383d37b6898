//! Load balancer registry over the classic ELB API.

use anyhow::Result;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancing::types::{
    HealthCheck as ElbHealthCheck, Instance, Listener as ElbListener, LoadBalancerDescription,
};
use aws_sdk_elasticloadbalancing::Client;
use portsync_reconcile::{HealthCheck, Listener, LoadBalancerState};

use super::call_failed;
use crate::error::AgentError;
use crate::registry::LoadBalancerRegistry;

/// Classic ELB-backed load balancer registry.
pub struct ElbRegistry {
    client: Client,
}

impl ElbRegistry {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

fn observed_state(name: &str, description: &LoadBalancerDescription) -> LoadBalancerState {
    LoadBalancerState {
        name: description.load_balancer_name().unwrap_or(name).to_string(),
        registered_instances: description
            .instances()
            .iter()
            .filter_map(|instance| instance.instance_id())
            .map(str::to_string)
            .collect(),
        listeners: description
            .listener_descriptions()
            .iter()
            .filter_map(|d| d.listener())
            .map(|l| Listener {
                balancer_port: l.load_balancer_port(),
                instance_port: l.instance_port(),
                protocol: l.protocol().to_string(),
                instance_protocol: l.instance_protocol().map(str::to_string),
                ssl_certificate_id: l.ssl_certificate_id().map(str::to_string),
            })
            .collect(),
        health_check: description.health_check().map(|hc| HealthCheck {
            target: hc.target().to_string(),
            interval: hc.interval(),
            timeout: hc.timeout(),
            unhealthy_threshold: hc.unhealthy_threshold(),
            healthy_threshold: hc.healthy_threshold(),
        }),
    }
}

#[async_trait]
impl LoadBalancerRegistry for ElbRegistry {
    async fn describe_load_balancer(&self, name: &str) -> Result<LoadBalancerState> {
        let output = match self
            .client
            .describe_load_balancers()
            .load_balancer_names(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_access_point_not_found_exception());
                if not_found {
                    return Err(AgentError::LoadBalancerNotFound(name.to_string()).into());
                }
                return Err(call_failed("DescribeLoadBalancers", e));
            }
        };

        let description = output
            .load_balancer_descriptions()
            .first()
            .ok_or_else(|| AgentError::LoadBalancerNotFound(name.to_string()))?;

        Ok(observed_state(name, description))
    }

    async fn register_instance(&self, name: &str, instance_id: &str) -> Result<()> {
        self.client
            .register_instances_with_load_balancer()
            .load_balancer_name(name)
            .instances(Instance::builder().instance_id(instance_id).build())
            .send()
            .await
            .map_err(|e| call_failed("RegisterInstancesWithLoadBalancer", e))?;
        Ok(())
    }

    async fn deregister_instance(&self, name: &str, instance_id: &str) -> Result<()> {
        self.client
            .deregister_instances_from_load_balancer()
            .load_balancer_name(name)
            .instances(Instance::builder().instance_id(instance_id).build())
            .send()
            .await
            .map_err(|e| call_failed("DeregisterInstancesFromLoadBalancer", e))?;
        Ok(())
    }

    async fn delete_listener(&self, name: &str, balancer_port: i32) -> Result<()> {
        self.client
            .delete_load_balancer_listeners()
            .load_balancer_name(name)
            .load_balancer_ports(balancer_port)
            .send()
            .await
            .map_err(|e| call_failed("DeleteLoadBalancerListeners", e))?;
        Ok(())
    }

    async fn create_listener(&self, name: &str, listener: &Listener) -> Result<()> {
        let listener = ElbListener::builder()
            .load_balancer_port(listener.balancer_port)
            .instance_port(listener.instance_port)
            .protocol(listener.protocol.as_str())
            .set_instance_protocol(listener.instance_protocol.clone())
            .set_ssl_certificate_id(listener.ssl_certificate_id.clone())
            .build()?;

        self.client
            .create_load_balancer_listeners()
            .load_balancer_name(name)
            .listeners(listener)
            .send()
            .await
            .map_err(|e| call_failed("CreateLoadBalancerListeners", e))?;
        Ok(())
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> Result<()> {
        let health_check = ElbHealthCheck::builder()
            .target(health_check.target.as_str())
            .interval(health_check.interval)
            .timeout(health_check.timeout)
            .unhealthy_threshold(health_check.unhealthy_threshold)
            .healthy_threshold(health_check.healthy_threshold)
            .build()?;

        self.client
            .configure_health_check()
            .load_balancer_name(name)
            .health_check(health_check)
            .send()
            .await
            .map_err(|e| call_failed("ConfigureHealthCheck", e))?;
        Ok(())
    }
}
