//! Node readiness from the cluster's control plane
//!
//! The auto scaling group only knows whether an instance is in service.
//! Whether its kubelet has joined the cluster and reports `Ready` comes from
//! the Kubernetes `Node` objects, which are matched to instances through
//! `spec.providerID` (`aws:///<zone>/<instance id>`).

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use tracing::debug;

/// What the control plane reports for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub name: String,
    pub ready: bool,
    pub kubelet_version: String,
}

/// Instance id at the end of an AWS provider id
pub fn instance_id_from_provider_id(provider_id: &str) -> Option<&str> {
    provider_id
        .rsplit('/')
        .next()
        .filter(|id| id.starts_with("i-"))
}

/// Instance id and readiness of a node, if it is backed by an EC2 instance
pub fn node_row(node: &Node) -> Option<(String, NodeRow)> {
    let provider_id = node.spec.as_ref()?.provider_id.as_deref()?;
    let instance_id = instance_id_from_provider_id(provider_id)?;
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True");
    let kubelet_version = status
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.kubelet_version.clone())
        .unwrap_or_default();

    Some((
        instance_id.to_string(),
        NodeRow {
            name: node.name_any(),
            ready,
            kubelet_version,
        },
    ))
}

/// Lists nodes of the cluster selected by the local kubeconfig
pub struct NodeReadiness {
    nodes: Api<Node>,
}

impl NodeReadiness {
    /// Connect using the kubeconfig (or in-cluster config) of this machine
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client from kubeconfig")?;
        Ok(Self {
            nodes: Api::all(client),
        })
    }

    /// Every node backed by an EC2 instance, keyed by instance id
    pub async fn by_instance(&self) -> Result<HashMap<String, NodeRow>> {
        let list = self
            .nodes
            .list(&ListParams::default())
            .await
            .context("Failed to list cluster nodes")?;

        let rows: HashMap<String, NodeRow> = list.items.iter().filter_map(node_row).collect();
        debug!(nodes = list.items.len(), matched = rows.len(), "Listed cluster nodes");
        Ok(rows)
    }
}
