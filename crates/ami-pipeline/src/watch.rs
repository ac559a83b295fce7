//! Rollout observer
//!
//! Follows one node group while it rolls onto a new image and prints a
//! table of its instances on every tick. Read-only: nothing is changed.
//! The rollout has converged when the update (if one is given) succeeded,
//! the node group is ACTIVE again, and every desired instance is in service
//! and, unless readiness checks are off, a `Ready` node of the cluster.

use crate::aws::autoscaling::AutoScalingClient;
use crate::aws::ec2::Ec2Client;
use crate::aws::eks::EksClient;
use crate::aws::executor::CrossAccountExecutor;
use crate::config::WatchConfig;
use crate::nodes::{NodeReadiness, NodeRow};
use crate::wait::poll_until_terminal;
use ami_pipeline_common::{Convergence, NodePoolStatus, PollOutcome, UpdateStatus};
use anyhow::{Context, Result};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use std::collections::HashMap;
use tracing::info;

const IN_SERVICE: &str = "InService";

/// One instance backing the node group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub instance_id: String,
    pub ec2_state: String,
    pub lifecycle_state: String,
    /// Matching cluster node, if one has registered
    pub node: Option<NodeRow>,
}

impl InstanceRow {
    fn is_ready(&self) -> bool {
        self.node.as_ref().is_some_and(|n| n.ready)
    }
}

/// Everything observed in one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSnapshot {
    pub status: NodePoolStatus,
    pub update_status: Option<UpdateStatus>,
    pub desired: usize,
    pub instances: Vec<InstanceRow>,
    /// Whether node readiness gates convergence
    pub node_readiness: bool,
}

impl RolloutSnapshot {
    pub fn in_service(&self) -> usize {
        self.instances
            .iter()
            .filter(|i| i.lifecycle_state == IN_SERVICE)
            .count()
    }

    pub fn ready(&self) -> usize {
        self.instances.iter().filter(|i| i.is_ready()).count()
    }

    pub fn convergence(&self) -> Convergence {
        if let Some(update) = self.update_status {
            match update.convergence() {
                Convergence::Succeeded => {}
                other => return other,
            }
        }

        let settled = self.status == NodePoolStatus::Active
            && self.instances.len() == self.desired
            && self.in_service() == self.desired
            && (!self.node_readiness || self.ready() == self.desired);
        if settled {
            Convergence::Succeeded
        } else {
            Convergence::Pending
        }
    }

    pub fn render(&self, node_group: &str) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Instance ID"),
                Cell::new("EC2 State"),
                Cell::new("Lifecycle"),
                Cell::new("Node Ready"),
                Cell::new("Kubelet"),
            ]);

        for row in &self.instances {
            let (ready, kubelet) = match &row.node {
                Some(node) if node.ready => ("True", node.kubelet_version.as_str()),
                Some(node) => ("False", node.kubelet_version.as_str()),
                None => ("N/A", ""),
            };
            table.add_row(vec![
                Cell::new(&row.instance_id),
                Cell::new(&row.ec2_state),
                Cell::new(&row.lifecycle_state),
                Cell::new(ready),
                Cell::new(kubelet),
            ]);
        }

        let update = self
            .update_status
            .map(|u| format!(" | Update: {u}"))
            .unwrap_or_default();
        let ready = if self.node_readiness {
            format!(" | Ready: {}/{}", self.ready(), self.desired)
        } else {
            String::new()
        };
        format!(
            "Node group: {node_group} | Status: {}{update} | In service: {}/{}{ready}\n{table}",
            self.status,
            self.in_service(),
            self.desired,
        )
    }
}

struct Observer {
    eks: EksClient,
    autoscaling: AutoScalingClient,
    ec2: Ec2Client,
    nodes: Option<NodeReadiness>,
}

impl Observer {
    async fn snapshot(&self, config: &WatchConfig) -> Result<RolloutSnapshot> {
        let group = self
            .eks
            .describe_node_group(&config.cluster_name, &config.node_group)
            .await?;

        let update_status = match &config.update_id {
            Some(update_id) => Some(
                self.eks
                    .describe_update(&config.cluster_name, &config.node_group, update_id)
                    .await?,
            ),
            None => None,
        };

        let mut desired = None;
        let mut members = Vec::new();
        for name in &group.autoscaling_groups {
            if let Some(asg) = self.autoscaling.describe_group(name).await? {
                *desired.get_or_insert(0) += asg.desired_capacity;
                members.extend(asg.instances);
            }
        }
        let desired = desired.or(group.desired_size).unwrap_or_default();

        let ids: Vec<String> = members.iter().map(|m| m.instance_id.clone()).collect();
        let states = self.ec2.instance_states(&ids).await?;

        // An unreachable API server leaves every node unknown, hence not ready
        let mut nodes = match &self.nodes {
            Some(readiness) => readiness.by_instance().await.unwrap_or_else(|e| {
                eprintln!("Error reading cluster nodes: {e:#}");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        let instances = members
            .into_iter()
            .map(|m| InstanceRow {
                ec2_state: states
                    .get(&m.instance_id)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                node: nodes.remove(&m.instance_id),
                instance_id: m.instance_id,
                lifecycle_state: m.lifecycle_state,
            })
            .collect();

        Ok(RolloutSnapshot {
            status: group.status,
            update_status,
            desired: usize::try_from(desired).unwrap_or_default(),
            instances,
            node_readiness: self.nodes.is_some(),
        })
    }
}

/// Watch a rollout until it converges, fails, times out or is interrupted.
///
/// Returns `None` when stopped with Ctrl-C. Errors during a tick are
/// printed and the observer keeps going.
pub async fn run_watch(
    executor: &CrossAccountExecutor,
    config: &WatchConfig,
) -> Result<Option<PollOutcome>> {
    let ctx = match &config.account_id {
        Some(account_id) => {
            executor
                .context_for(account_id, config.target_role_name.as_deref(), &config.region)
                .await?
        }
        None => executor.ambient_context(&config.region),
    };
    let nodes = if config.node_readiness {
        let readiness = NodeReadiness::connect().await.with_context(|| {
            format!(
                "Node readiness needs a kubeconfig for {} (aws eks update-kubeconfig), or pass --skip-node-readiness",
                config.cluster_name
            )
        })?;
        Some(readiness)
    } else {
        info!("Node readiness checks disabled");
        None
    };
    let observer = Observer {
        eks: EksClient::from_context(&ctx),
        autoscaling: AutoScalingClient::from_context(&ctx),
        ec2: Ec2Client::from_context(&ctx),
        nodes,
    };

    let watch = poll_until_terminal(
        &config.poll,
        &config.node_group,
        || async {
            Ok::<_, anyhow::Error>(match observer.snapshot(config).await {
                Ok(snapshot) => {
                    println!("{}", snapshot.render(&config.node_group));
                    Some(snapshot)
                }
                Err(e) => {
                    eprintln!("Error in monitoring loop: {e:#}");
                    None
                }
            })
        },
        |snapshot: &Option<RolloutSnapshot>| {
            snapshot
                .as_ref()
                .map_or(Convergence::Pending, RolloutSnapshot::convergence)
        },
    );

    tokio::select! {
        outcome = watch => {
            let outcome = outcome?;
            info!(node_group = %config.node_group, %outcome, "Rollout observation finished");
            Ok(Some(outcome))
        }
        _ = tokio::signal::ctrl_c() => {
            info!(node_group = %config.node_group, "Observation stopped");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ready: bool) -> Option<NodeRow> {
        Some(NodeRow {
            name: "ip-10-0-1-5".to_string(),
            ready,
            kubelet_version: "v1.30.4".to_string(),
        })
    }

    fn row(id: &str, lifecycle: &str) -> InstanceRow {
        InstanceRow {
            instance_id: id.to_string(),
            ec2_state: "running".to_string(),
            lifecycle_state: lifecycle.to_string(),
            node: node(true),
        }
    }

    fn snapshot(status: NodePoolStatus, rows: Vec<InstanceRow>) -> RolloutSnapshot {
        RolloutSnapshot {
            status,
            update_status: None,
            desired: 2,
            instances: rows,
            node_readiness: true,
        }
    }

    #[test]
    fn test_converges_when_active_and_all_in_service() {
        let s = snapshot(
            NodePoolStatus::Active,
            vec![row("i-1", IN_SERVICE), row("i-2", IN_SERVICE)],
        );
        assert_eq!(s.ready(), 2);
        assert_eq!(s.convergence(), Convergence::Succeeded);
    }

    #[test]
    fn test_pending_while_rolling() {
        let updating = snapshot(
            NodePoolStatus::Updating,
            vec![row("i-1", IN_SERVICE), row("i-2", IN_SERVICE)],
        );
        assert_eq!(updating.convergence(), Convergence::Pending);

        let surge = snapshot(
            NodePoolStatus::Active,
            vec![
                row("i-1", IN_SERVICE),
                row("i-2", IN_SERVICE),
                row("i-3", "Terminating"),
            ],
        );
        assert_eq!(surge.convergence(), Convergence::Pending);

        let warming = snapshot(
            NodePoolStatus::Active,
            vec![row("i-1", IN_SERVICE), row("i-2", "Pending")],
        );
        assert_eq!(warming.convergence(), Convergence::Pending);
    }

    #[test]
    fn test_in_service_instance_must_be_ready_node() {
        let mut joining = row("i-2", IN_SERVICE);
        joining.node = node(false);
        let s = snapshot(NodePoolStatus::Active, vec![row("i-1", IN_SERVICE), joining]);
        assert_eq!(s.in_service(), 2);
        assert_eq!(s.ready(), 1);
        assert_eq!(s.convergence(), Convergence::Pending);

        let mut unregistered = row("i-2", IN_SERVICE);
        unregistered.node = None;
        let s = snapshot(
            NodePoolStatus::Active,
            vec![row("i-1", IN_SERVICE), unregistered],
        );
        assert_eq!(s.convergence(), Convergence::Pending);
    }

    #[test]
    fn test_readiness_ignored_when_disabled() {
        let mut unregistered = row("i-2", IN_SERVICE);
        unregistered.node = None;
        let mut s = snapshot(
            NodePoolStatus::Active,
            vec![row("i-1", IN_SERVICE), unregistered],
        );
        s.node_readiness = false;
        assert_eq!(s.convergence(), Convergence::Succeeded);
    }

    #[test]
    fn test_update_status_gates_convergence() {
        let mut s = snapshot(
            NodePoolStatus::Active,
            vec![row("i-1", IN_SERVICE), row("i-2", IN_SERVICE)],
        );

        s.update_status = Some(UpdateStatus::InProgress);
        assert_eq!(s.convergence(), Convergence::Pending);

        s.update_status = Some(UpdateStatus::Failed);
        assert_eq!(s.convergence(), Convergence::Failed);

        s.update_status = Some(UpdateStatus::Successful);
        assert_eq!(s.convergence(), Convergence::Succeeded);
    }

    #[test]
    fn test_render_lists_instances() {
        let mut pending = row("i-1", "Pending");
        pending.node = None;
        let mut s = snapshot(
            NodePoolStatus::Updating,
            vec![pending, row("i-2", IN_SERVICE)],
        );
        s.update_status = Some(UpdateStatus::InProgress);

        let out = s.render("workers");
        assert!(out.contains("Node group: workers"));
        assert!(out.contains("Status: UPDATING"));
        assert!(out.contains("Update: InProgress"));
        assert!(out.contains("In service: 1/2"));
        assert!(out.contains("Ready: 1/2"));
        assert!(out.contains("i-1"));
        assert!(out.contains("Pending"));
        assert!(out.contains("N/A"));
        assert!(out.contains("v1.30.4"));

        s.node_readiness = false;
        assert!(!s.render("workers").contains("Ready: "));
    }
}
