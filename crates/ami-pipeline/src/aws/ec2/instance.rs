//! Instance state lookup for the rollout observer

use super::Ec2Client;
use anyhow::{Context, Result};
use std::collections::HashMap;

impl Ec2Client {
    /// Map of instance id to EC2 state name (`running`, `pending`, ...)
    pub async fn instance_states(&self, instance_ids: &[String]) -> Result<HashMap<String, String>> {
        if instance_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .client
            .describe_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("Failed to describe instances")?;

        let states = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .filter_map(|instance| {
                let id = instance.instance_id()?;
                let state = instance
                    .state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Some((id.to_string(), state))
            })
            .collect();

        Ok(states)
    }
}
