//! Auto scaling group lookup for the rollout observer

use crate::aws::context::AwsContext;
use anyhow::{Context, Result};

/// One instance of an auto scaling group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInstance {
    pub instance_id: String,
    /// `InService`, `Pending`, `Terminating`, ...
    pub lifecycle_state: String,
}

/// Capacity and membership of an auto scaling group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub name: String,
    pub desired_capacity: i32,
    pub instances: Vec<GroupInstance>,
}

pub struct AutoScalingClient {
    client: aws_sdk_autoscaling::Client,
}

impl AutoScalingClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.autoscaling_client(),
        }
    }

    /// Describe one group, `None` if it does not exist
    pub async fn describe_group(&self, name: &str) -> Result<Option<GroupSnapshot>> {
        let response = self
            .client
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .with_context(|| format!("Failed to describe auto scaling group {name}"))?;

        let Some(group) = response.auto_scaling_groups().first() else {
            return Ok(None);
        };

        let instances = group
            .instances()
            .iter()
            .filter_map(|i| {
                Some(GroupInstance {
                    instance_id: i.instance_id()?.to_string(),
                    lifecycle_state: i
                        .lifecycle_state()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| "Unknown".to_string()),
                })
            })
            .collect();

        Ok(Some(GroupSnapshot {
            name: name.to_string(),
            desired_capacity: group.desired_capacity().unwrap_or_default(),
            instances,
        }))
    }
}
