//! Configuration types for the pipelines
//!
//! Each pipeline is invoked with a request payload whose fields are all
//! optional. Payload fields win over CLI flags, which win over environment
//! variables (handled by clap), which win over built-in defaults. Required
//! identifiers are checked here, before any AWS call is made.

use crate::wait::PollConfig;
use ami_pipeline_common::defaults::{
    DEFAULT_AMI_DESCRIPTION, DEFAULT_TARGET_ROLE_NAME, default_ami_name,
};
use ami_pipeline_common::{cluster_parameter_name, parse_account_list};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use thiserror::Error;

/// Invocation errors, raised before any external call
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),

    #[error("Failed to read request payload {path}")]
    ReadPayload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid request payload")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Parse a request payload given inline (`{...}`) or as a path to a JSON file.
pub fn load_event<T: DeserializeOwned>(source: &str) -> Result<T, ConfigError> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let path = PathBuf::from(source);
    let contents = std::fs::read_to_string(&path)
        .map_err(|source| ConfigError::ReadPayload { path, source })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Required, non-blank field
fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Role name with the default applied; an explicitly empty name disables
/// cross-account delegation.
fn role_name(value: Option<String>) -> Option<String> {
    match value {
        None => Some(DEFAULT_TARGET_ROLE_NAME.to_string()),
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(v.trim().to_string()),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Promotion request payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromoteRequest {
    pub instance_id: Option<String>,
    pub parameter_name: Option<String>,
    pub ami_name: Option<String>,
    pub ami_description: Option<String>,
    /// Comma-separated account ids
    pub share_accounts: Option<String>,
    pub target_role_name: Option<String>,
    pub sns_topic_arn: Option<String>,
}

impl PromoteRequest {
    /// Fill every field missing from `self` with the one from `fallback`
    pub fn or(self, fallback: Self) -> Self {
        Self {
            instance_id: self.instance_id.or(fallback.instance_id),
            parameter_name: self.parameter_name.or(fallback.parameter_name),
            ami_name: self.ami_name.or(fallback.ami_name),
            ami_description: self.ami_description.or(fallback.ami_description),
            share_accounts: self.share_accounts.or(fallback.share_accounts),
            target_role_name: self.target_role_name.or(fallback.target_role_name),
            sns_topic_arn: self.sns_topic_arn.or(fallback.sns_topic_arn),
        }
    }

    /// Validate and apply defaults.
    ///
    /// `dr_region` of `None` disables the DR branch.
    pub fn into_config(
        self,
        region: impl Into<String>,
        dr_region: Option<String>,
        poll: PollConfig,
    ) -> Result<PromoteConfig, ConfigError> {
        let instance_id = required(self.instance_id, "instance_id")?;
        let parameter_name = required(self.parameter_name, "parameter_name")?;

        Ok(PromoteConfig {
            instance_id,
            parameter_name,
            ami_name: optional(self.ami_name)
                .unwrap_or_else(|| default_ami_name(chrono::Utc::now().timestamp())),
            ami_description: optional(self.ami_description)
                .unwrap_or_else(|| DEFAULT_AMI_DESCRIPTION.to_string()),
            share_accounts: self
                .share_accounts
                .as_deref()
                .map(parse_account_list)
                .unwrap_or_default(),
            target_role_name: role_name(self.target_role_name),
            sns_topic_arn: optional(self.sns_topic_arn),
            region: region.into(),
            dr_region,
            poll,
        })
    }
}

/// Validated configuration for one promotion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteConfig {
    /// Instance the golden image is built from
    pub instance_id: String,
    /// Discovery key the image id is published under
    pub parameter_name: String,
    pub ami_name: String,
    pub ami_description: String,
    /// Accounts the image is shared with and published to
    pub share_accounts: Vec<String>,
    /// Role assumed in each target account; `None` skips target publishing
    pub target_role_name: Option<String>,
    pub sns_topic_arn: Option<String>,
    /// Primary region
    pub region: String,
    /// Disaster-recovery region, `None` when DR replication is disabled
    pub dr_region: Option<String>,
    pub poll: PollConfig,
}

/// Patch request payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PatchRequest {
    pub account_id: Option<String>,
    pub cluster_name: Option<String>,
    /// Overrides the cluster-scoped discovery key
    pub parameter_name: Option<String>,
    pub target_role_name: Option<String>,
    pub sns_topic_arn: Option<String>,
}

impl PatchRequest {
    /// Fill every field missing from `self` with the one from `fallback`
    pub fn or(self, fallback: Self) -> Self {
        Self {
            account_id: self.account_id.or(fallback.account_id),
            cluster_name: self.cluster_name.or(fallback.cluster_name),
            parameter_name: self.parameter_name.or(fallback.parameter_name),
            target_role_name: self.target_role_name.or(fallback.target_role_name),
            sns_topic_arn: self.sns_topic_arn.or(fallback.sns_topic_arn),
        }
    }

    pub fn into_config(
        self,
        region: impl Into<String>,
        dry_run: bool,
    ) -> Result<PatchConfig, ConfigError> {
        let account_id = required(self.account_id, "account_id")?;
        let cluster_name = required(self.cluster_name, "cluster_name")?;

        Ok(PatchConfig {
            parameter_name: optional(self.parameter_name)
                .unwrap_or_else(|| cluster_parameter_name(&cluster_name)),
            account_id,
            cluster_name,
            target_role_name: role_name(self.target_role_name),
            sns_topic_arn: optional(self.sns_topic_arn),
            region: region.into(),
            dry_run,
        })
    }
}

/// Validated configuration for patching one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    /// Account owning the cluster
    pub account_id: String,
    pub cluster_name: String,
    /// Discovery key holding the target image id
    pub parameter_name: String,
    pub target_role_name: Option<String>,
    pub sns_topic_arn: Option<String>,
    pub region: String,
    /// Decide per node group but never create versions or trigger updates
    pub dry_run: bool,
}

/// Rollout observer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub cluster_name: String,
    pub node_group: String,
    /// Update to follow, as returned by the patcher
    pub update_id: Option<String>,
    /// Account owning the cluster; `None` observes with the ambient identity
    pub account_id: Option<String>,
    pub target_role_name: Option<String>,
    pub region: String,
    /// Require every instance to be a `Ready` node before converging
    pub node_readiness: bool,
    pub poll: PollConfig,
}
