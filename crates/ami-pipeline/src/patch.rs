//! EKS node group patching
//!
//! Moves every managed node group of one cluster onto the image published
//! under the cluster's discovery key. Each node group is decided on its own:
//! groups already on the target image, busy groups and groups that are not
//! ACTIVE are skipped, and a failure on one group never stops the others.
//! The run only triggers updates; it does not wait for them to finish.

use crate::aws::ec2::{LaunchTemplateOperations, LaunchTemplateRef};
use crate::aws::eks::{NodeGroupOperations, is_update_conflict};
use crate::aws::executor::{ClientFactory, RegionClients};
use crate::aws::sns::{Notifier, send_notification};
use crate::aws::ssm::ParameterOperations;
use crate::config::PatchConfig;
use ami_pipeline_common::outcome::render_lines;
use ami_pipeline_common::{ItemOutcome, NodePoolStatus, OutcomeKind};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Decision taken for one node group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolDecision {
    /// An update is already running on the group
    AlreadyUpdating,
    /// Status other than ACTIVE
    NotPatchable(NodePoolStatus),
    /// Launch template already references the target image
    UpToDate,
    /// The update was refused because another one started meanwhile; the
    /// launch template version created for it stays unused
    UpdateRejected { version: String },
    UpdateTriggered { update_id: String, version: String },
    /// Dry run: the group would have been updated
    WouldUpdate,
}

impl PoolDecision {
    fn into_outcome(self, node_group: &str, target_image: &str) -> ItemOutcome {
        match self {
            Self::AlreadyUpdating => ItemOutcome::skipped(
                node_group,
                format!("{node_group} is already UPDATING, skipping"),
            ),
            Self::NotPatchable(status) => ItemOutcome::skipped(
                node_group,
                format!("{node_group}: status is {status}, skipping"),
            ),
            Self::UpToDate => ItemOutcome::skipped(
                node_group,
                format!("{node_group}: already up-to-date with {target_image}, skipping"),
            ),
            Self::UpdateRejected { version } => ItemOutcome::skipped(
                node_group,
                format!(
                    "{node_group} is already UPDATING, skipping (launch template version {version} left unused)"
                ),
            ),
            Self::UpdateTriggered { update_id, version } => ItemOutcome::ok(
                node_group,
                format!(
                    "{node_group}: Update Triggered (Update ID: {update_id}, launch template version {version})"
                ),
            ),
            Self::WouldUpdate => ItemOutcome::skipped(
                node_group,
                format!("{node_group}: would update to {target_image} (dry run)"),
            ),
        }
    }
}

/// Result of patching one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    #[serde(rename = "account")]
    pub account_id: String,
    #[serde(rename = "cluster")]
    pub cluster_name: String,
    pub target_ami_id: String,
    pub dry_run: bool,
    /// One entry per node group, in listing order
    pub results: Vec<ItemOutcome>,
}

impl PatchReport {
    /// Body of the run notification
    pub fn summary(&self) -> String {
        format!("Results:\n\n{}", render_lines(&self.results))
    }

    pub fn updates_triggered(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.kind == OutcomeKind::Ok)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(ItemOutcome::is_failed)
    }
}

pub fn notification_subject(cluster_name: &str) -> String {
    format!("EKS Patching: {cluster_name}")
}

/// Patch every node group of the configured cluster.
///
/// Sends exactly one notification. Errors that stop the whole run (client
/// resolution, target lookup, listing node groups) are notified and then
/// returned.
pub async fn run_patch<F, N>(factory: &F, notifier: &N, config: &PatchConfig) -> Result<PatchReport>
where
    F: ClientFactory,
    N: Notifier,
{
    let subject = notification_subject(&config.cluster_name);
    let topic = config.sns_topic_arn.as_deref();

    match patch_cluster(factory, config).await {
        Ok(report) => {
            info!(
                cluster = %report.cluster_name,
                updates = report.updates_triggered(),
                "Patching complete"
            );
            send_notification(notifier, topic, &subject, &report.summary()).await;
            Ok(report)
        }
        Err(e) => {
            error!(cluster = %config.cluster_name, error = ?e, "Patching failed");
            let body = format!("Results:\n\n[FAILED] {e:#}");
            send_notification(notifier, topic, &subject, &body).await;
            Err(e)
        }
    }
}

async fn patch_cluster<F: ClientFactory>(factory: &F, config: &PatchConfig) -> Result<PatchReport> {
    info!(
        account_id = %config.account_id,
        cluster = %config.cluster_name,
        dry_run = config.dry_run,
        "Processing cluster"
    );

    let clients = factory
        .resolve(
            &config.account_id,
            config.target_role_name.as_deref(),
            &config.region,
        )
        .await?;

    let target = fetch_target(clients.parameters(), &config.parameter_name).await?;

    let node_groups = clients
        .node_groups()
        .list_node_groups(&config.cluster_name)
        .await
        .with_context(|| format!("Failed to list node groups of {}", config.cluster_name))?;

    let mut results = Vec::with_capacity(node_groups.len().max(1));
    if node_groups.is_empty() {
        info!(cluster = %config.cluster_name, "No node groups found");
        results.push(ItemOutcome::skipped(
            &config.cluster_name,
            format!("No node groups found in {}", config.cluster_name),
        ));
    }

    for node_group in &node_groups {
        let outcome = match patch_node_group(&clients, config, node_group, &target).await {
            Ok(decision) => decision.into_outcome(node_group, &target),
            Err(e) => {
                error!(node_group = %node_group, error = ?e, "Error processing node group");
                ItemOutcome::failed(node_group, format!("{node_group}: Error - {e:#}"))
            }
        };
        info!(node_group = %node_group, result = %outcome, "Processed node group");
        results.push(outcome);
    }

    Ok(PatchReport {
        account_id: config.account_id.clone(),
        cluster_name: config.cluster_name.clone(),
        target_ami_id: target,
        dry_run: config.dry_run,
        results,
    })
}

/// Image id published under the cluster's discovery key
async fn fetch_target<P: ParameterOperations>(parameters: &P, name: &str) -> Result<String> {
    let target = parameters
        .get_parameter(name)
        .await
        .with_context(|| format!("Failed to fetch AMI from {name}"))?;
    info!(parameter = %name, target_ami_id = %target, "Target AMI");
    Ok(target)
}

async fn patch_node_group<C: RegionClients>(
    clients: &C,
    config: &PatchConfig,
    node_group: &str,
    target: &str,
) -> Result<PoolDecision> {
    let cluster = &config.cluster_name;
    let info = clients
        .node_groups()
        .describe_node_group(cluster, node_group)
        .await?;

    if info.status == NodePoolStatus::Updating {
        info!(node_group = %node_group, "Node group is already updating, skipping");
        return Ok(PoolDecision::AlreadyUpdating);
    }
    if !info.status.is_patchable() {
        warn!(node_group = %node_group, status = %info.status, "Node group is not ACTIVE, skipping");
        return Ok(PoolDecision::NotPatchable(info.status));
    }

    let template = info
        .launch_template
        .with_context(|| format!("{node_group} has no launch template to patch"))?;

    // An unreadable template does not block the update
    match clients.launch_templates().template_image_id(&template).await {
        Ok(Some(current)) if current == target => {
            info!(node_group = %node_group, image_id = %current, "Already up-to-date");
            return Ok(PoolDecision::UpToDate);
        }
        Ok(current) => {
            debug!(node_group = %node_group, current = ?current, target = %target, "Image differs from target");
        }
        Err(e) => {
            warn!(node_group = %node_group, error = ?e, "Could not verify current AMI, updating anyway");
        }
    }

    if config.dry_run {
        return Ok(PoolDecision::WouldUpdate);
    }

    let version = clients
        .launch_templates()
        .create_template_version(&template, target)
        .await?;
    info!(template = %template, version = %version, "Created launch template version");

    let new_template = LaunchTemplateRef::new(&template.id, &version);
    match clients
        .node_groups()
        .update_node_group_version(cluster, node_group, &new_template)
        .await
    {
        Ok(update_id) => Ok(PoolDecision::UpdateTriggered { update_id, version }),
        Err(e) if is_update_conflict(&e) => {
            warn!(
                node_group = %node_group,
                template = %template.id,
                orphaned_version = %version,
                "Update already in progress, launch template version left unused"
            );
            Ok(PoolDecision::UpdateRejected { version })
        }
        Err(e) => Err(e),
    }
}
