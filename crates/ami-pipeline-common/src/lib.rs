//! ami-pipeline-common - Shared types and constants
//!
//! This crate holds the vocabulary shared by the promotion pipeline, the
//! node group patcher and the observer, without any AWS SDK dependencies.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`outcome`]: Tagged per-item results for fan-out loops
//! - [`status`]: Lifecycle states and convergence outcomes
//! - [`tags`]: AWS resource tag keys applied to pipeline-created images

pub mod defaults;
pub mod outcome;
pub mod status;
pub mod tags;

pub use outcome::{ItemOutcome, OutcomeKind};
pub use status::{Convergence, ImageState, NodePoolStatus, PollOutcome, UpdateStatus};

/// Discovery store key holding the target image for a cluster.
pub fn cluster_parameter_name(cluster_name: &str) -> String {
    format!("{}{}", defaults::CLUSTER_PARAMETER_PREFIX, cluster_name)
}

/// Split a comma-separated account list, trimming whitespace and dropping blanks.
pub fn parse_account_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
