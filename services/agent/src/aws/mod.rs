//! Cloud-backed collaborators.
//!
//! - [`EcsInventory`]: task inventory over the ECS API
//! - [`ElbRegistry`]: load balancer registry over the classic ELB API
//! - [`S3Fetcher`]: `s3://bucket/key` document fetcher

use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::error::DisplayErrorContext;

mod ecs;
mod elb;
mod s3;

pub use ecs::EcsInventory;
pub use elb::ElbRegistry;
pub use s3::S3Fetcher;

/// Load shared SDK configuration for `region`.
///
/// Credentials come from the default provider chain. Every operation,
/// retries included, is bounded by `call_timeout`.
pub async fn load_sdk_config(region: &str, call_timeout: Duration) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .operation_timeout(call_timeout)
        .build();

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .timeout_config(timeouts)
        .load()
        .await
}

/// Wrap an SDK error with the operation name and its full error chain.
fn call_failed<E>(operation: &str, err: E) -> anyhow::Error
where
    E: std::error::Error,
{
    anyhow::anyhow!("{operation} failed: {}", DisplayErrorContext(err))
}
