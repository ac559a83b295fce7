//! Tagged per-item results for best-effort fan-out loops
//!
//! Every account publish and every node group decision ends up as one
//! [`ItemOutcome`]. Failures are recorded here instead of being raised past
//! the loop, and the collected list becomes the notification body.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single item's result
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The item was acted on successfully
    Ok,
    /// The item was deliberately left alone
    Skipped,
    /// Acting on the item failed
    Failed,
}

/// Result for one item of a fan-out (an account, a node group)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Item the result belongs to (account id, node group name)
    pub item: String,
    pub kind: OutcomeKind,
    /// Human-readable line for the summary
    pub message: String,
}

impl ItemOutcome {
    pub fn ok(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Ok, message)
    }

    pub fn skipped(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Skipped, message)
    }

    pub fn failed(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(item, OutcomeKind::Failed, message)
    }

    fn new(item: impl Into<String>, kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Render outcomes as a multi-line summary, one line per item.
pub fn render_lines(outcomes: &[ItemOutcome]) -> String {
    outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
