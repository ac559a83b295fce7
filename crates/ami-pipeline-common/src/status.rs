//! Lifecycle states observed on external resources
//!
//! The services report their states as strings. These enums normalise them
//! and say how each one feeds the convergence poller.

use serde::{Deserialize, Serialize};

/// How a single observation relates to the state being waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Not terminal yet, keep polling
    Pending,
    /// Reached the desired state
    Succeeded,
    /// Reached a terminal failure state
    Failed,
    /// The resource does not exist
    Missing,
}

/// Result of waiting for a resource to converge
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollOutcome {
    Available,
    Failed,
    NotFound,
    Timeout,
}

impl PollOutcome {
    /// Map a terminal observation to an outcome, `None` while still pending.
    pub fn from_convergence(convergence: Convergence) -> Option<Self> {
        match convergence {
            Convergence::Pending => None,
            Convergence::Succeeded => Some(Self::Available),
            Convergence::Failed => Some(Self::Failed),
            Convergence::Missing => Some(Self::NotFound),
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Machine image lifecycle state
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Pending,
    Available,
    Failed,
}

impl ImageState {
    /// Normalise an EC2 image state string.
    ///
    /// `invalid`, `deregistered`, `error` and `disabled` are all terminal
    /// failures for the pipeline. Anything unrecognised is treated as still
    /// in progress.
    pub fn from_ec2(state: &str) -> Self {
        match state {
            "available" => Self::Available,
            "failed" | "error" | "invalid" | "deregistered" | "disabled" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn convergence(self) -> Convergence {
        match self {
            Self::Pending => Convergence::Pending,
            Self::Available => Convergence::Succeeded,
            Self::Failed => Convergence::Failed,
        }
    }
}

/// Managed node group status as reported by EKS
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodePoolStatus {
    Active,
    Creating,
    Updating,
    Deleting,
    CreateFailed,
    DeleteFailed,
    Degraded,
    #[default]
    Unknown,
}

impl NodePoolStatus {
    /// Parse an EKS status string, falling back to `Unknown`
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Only ACTIVE pools may be given a new launch template version
    pub fn is_patchable(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Status of an asynchronous node group update
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum UpdateStatus {
    InProgress,
    Successful,
    Failed,
    Cancelled,
    #[default]
    Unknown,
}

impl UpdateStatus {
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn convergence(self) -> Convergence {
        match self {
            Self::Successful => Convergence::Succeeded,
            Self::Failed | Self::Cancelled => Convergence::Failed,
            Self::InProgress | Self::Unknown => Convergence::Pending,
        }
    }
}
