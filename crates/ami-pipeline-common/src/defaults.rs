//! Default configuration values
//!
//! These constants keep the promotion pipeline, the patcher and the
//! observer in agreement about regions, names and timings.

/// Region the golden image is built in
pub const DEFAULT_PRIMARY_REGION: &str = "ap-south-1";

/// Disaster-recovery region the golden image is copied to
pub const DEFAULT_DR_REGION: &str = "ap-south-2";

/// Role assumed in target accounts for publishing and patching
pub const DEFAULT_TARGET_ROLE_NAME: &str = "CrossAccount-EKS-Patcher-Role";

/// Description applied to new images when none is supplied
pub const DEFAULT_AMI_DESCRIPTION: &str = "Golden Image created by ami-pipeline";

/// Prefix for generated image names, followed by a Unix timestamp
pub const AMI_NAME_PREFIX: &str = "golden-image";

/// Prefix of the cluster-scoped discovery key read by the patcher
pub const CLUSTER_PARAMETER_PREFIX: &str = "eks-ami/";

/// Fixed interval between convergence checks, in seconds
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Maximum time to wait for an image to become available, in seconds
pub const IMAGE_TIMEOUT_SECS: u64 = 1800;

/// Maximum time the observer watches a node group rollout, in seconds
pub const WATCH_TIMEOUT_SECS: u64 = 3600;

/// STS session name used when publishing to target accounts
pub const PROMOTE_SESSION_NAME: &str = "ami-pipeline-promote";

/// STS session name used when patching node groups
pub const PATCH_SESSION_NAME: &str = "ami-pipeline-patch";

/// Returns a default image name stamped with the given Unix time
pub fn default_ami_name(unix_secs: i64) -> String {
    format!("{AMI_NAME_PREFIX}-{unix_secs}")
}

/// Description written next to a published image id
pub fn parameter_description(ami_name: &str) -> String {
    format!("Golden Image AMI - {ami_name}")
}
