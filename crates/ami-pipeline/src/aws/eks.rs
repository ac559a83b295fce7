//! EKS managed node group operations

use crate::aws::context::AwsContext;
use crate::aws::ec2::LaunchTemplateRef;
use crate::aws::error::{classify_anyhow_error, classify_aws_error};
use ami_pipeline_common::{NodePoolStatus, UpdateStatus};
use anyhow::{Context, Result};
use aws_sdk_eks::Client;
use aws_sdk_eks::error::ProvideErrorMetadata;
use tracing::{debug, info};

/// What the patcher and the observer need to know about a node group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupInfo {
    pub name: String,
    pub status: NodePoolStatus,
    /// Launch template the group is pinned to, if it uses one
    pub launch_template: Option<LaunchTemplateRef>,
    /// Backing auto scaling groups
    pub autoscaling_groups: Vec<String>,
    pub desired_size: Option<i32>,
}

/// Node group operations used by the patcher
#[allow(async_fn_in_trait)]
pub trait NodeGroupOperations {
    /// Names of every managed node group in the cluster
    async fn list_node_groups(&self, cluster: &str) -> Result<Vec<String>>;

    async fn describe_node_group(&self, cluster: &str, node_group: &str) -> Result<NodeGroupInfo>;

    /// Point the node group at a launch template version and start a
    /// rolling update. Returns the update id without waiting for it.
    ///
    /// A group that already has an update running fails with
    /// [`crate::aws::AwsError::Conflict`].
    async fn update_node_group_version(
        &self,
        cluster: &str,
        node_group: &str,
        template: &LaunchTemplateRef,
    ) -> Result<String>;
}

/// EKS client scoped to one account and region
pub struct EksClient {
    client: Client,
}

impl EksClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.eks_client(),
        }
    }

    pub async fn list_node_groups(&self, cluster: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_nodegroups()
            .cluster_name(cluster)
            .into_paginator()
            .items()
            .send();

        let mut names = Vec::new();
        while let Some(name) = pages.next().await {
            names.push(name.with_context(|| format!("Failed to list node groups of {cluster}"))?);
        }

        debug!(cluster = %cluster, node_groups = ?names, "Listed node groups");
        Ok(names)
    }

    pub async fn describe_node_group(&self, cluster: &str, node_group: &str) -> Result<NodeGroupInfo> {
        let response = self
            .client
            .describe_nodegroup()
            .cluster_name(cluster)
            .nodegroup_name(node_group)
            .send()
            .await
            .with_context(|| format!("Failed to describe node group {node_group}"))?;

        let group = response
            .nodegroup()
            .with_context(|| format!("DescribeNodegroup returned nothing for {node_group}"))?;

        let launch_template = group.launch_template().and_then(|lt| {
            Some(LaunchTemplateRef::new(
                lt.id()?,
                lt.version().unwrap_or("$Default"),
            ))
        });

        let autoscaling_groups = group
            .resources()
            .map(|r| {
                r.auto_scaling_groups()
                    .iter()
                    .filter_map(|asg| asg.name().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(NodeGroupInfo {
            name: node_group.to_string(),
            status: group
                .status()
                .map(|s| NodePoolStatus::parse(s.as_str()))
                .unwrap_or_default(),
            launch_template,
            autoscaling_groups,
            desired_size: group.scaling_config().and_then(|c| c.desired_size()),
        })
    }

    pub async fn update_node_group_version(
        &self,
        cluster: &str,
        node_group: &str,
        template: &LaunchTemplateRef,
    ) -> Result<String> {
        let launch_template = aws_sdk_eks::types::LaunchTemplateSpecification::builder()
            .id(&template.id)
            .version(&template.version)
            .build();

        let response = match self
            .client
            .update_nodegroup_version()
            .cluster_name(cluster)
            .nodegroup_name(node_group)
            .launch_template(launch_template)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let classified = classify_aws_error(e.code(), e.message());
                if classified.is_conflict() {
                    return Err(anyhow::Error::new(classified))
                        .with_context(|| format!("Node group {node_group} is busy"));
                }
                return Err(e)
                    .with_context(|| format!("Failed to update node group {node_group}"));
            }
        };

        let update_id = response
            .update()
            .and_then(|u| u.id())
            .context("UpdateNodegroupVersion returned no update ID")?
            .to_string();

        info!(
            cluster = %cluster,
            node_group = %node_group,
            launch_template = %template,
            update_id = %update_id,
            "Node group update triggered"
        );
        Ok(update_id)
    }

    /// Status of a node group update (only the observer tracks this)
    pub async fn describe_update(
        &self,
        cluster: &str,
        node_group: &str,
        update_id: &str,
    ) -> Result<UpdateStatus> {
        let response = self
            .client
            .describe_update()
            .name(cluster)
            .nodegroup_name(node_group)
            .update_id(update_id)
            .send()
            .await
            .with_context(|| format!("Failed to describe update {update_id}"))?;

        let status = response
            .update()
            .and_then(|u| u.status())
            .map(|s| UpdateStatus::parse(s.as_str()))
            .unwrap_or_default();
        Ok(status)
    }
}

impl NodeGroupOperations for EksClient {
    async fn list_node_groups(&self, cluster: &str) -> Result<Vec<String>> {
        EksClient::list_node_groups(self, cluster).await
    }

    async fn describe_node_group(&self, cluster: &str, node_group: &str) -> Result<NodeGroupInfo> {
        EksClient::describe_node_group(self, cluster, node_group).await
    }

    async fn update_node_group_version(
        &self,
        cluster: &str,
        node_group: &str,
        template: &LaunchTemplateRef,
    ) -> Result<String> {
        EksClient::update_node_group_version(self, cluster, node_group, template).await
    }
}

/// Whether an update trigger failed because another update is running
pub fn is_update_conflict(error: &anyhow::Error) -> bool {
    classify_anyhow_error(error).is_conflict()
}
