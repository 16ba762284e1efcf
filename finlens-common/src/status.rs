//! Per-slice fetch lifecycle status shared by services and events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one named data slice within a fetch run
///
/// Transitions are forward-only: `Pending → Loading → {Success | Empty | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Loading,
    Success,
    Empty,
    Error,
}

impl SourceStatus {
    /// True for `Success`, `Empty` and `Error`
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceStatus::Success | SourceStatus::Empty | SourceStatus::Error)
    }

    /// Whether `self → next` is a legal transition
    ///
    /// `Loading` cannot be skipped and terminal states are final.
    pub fn can_transition_to(self, next: SourceStatus) -> bool {
        match (self, next) {
            (SourceStatus::Pending, SourceStatus::Loading) => true,
            (SourceStatus::Loading, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Loading => "loading",
            SourceStatus::Success => "success",
            SourceStatus::Empty => "empty",
            SourceStatus::Error => "error",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
