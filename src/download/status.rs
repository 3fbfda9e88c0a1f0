//! Download status and its state machine.
//!
//! ```text
//! pending ──▶ downloading ──▶ completed†
//!    │            │  ▲ │
//!    │            │  │ └──▶ failed ──▶ retrying ──▶ downloading
//!    │            ▼  │
//!    │          paused
//!    └──────────────────────────▶ cancelled†
//! ```
//!
//! Every non-terminal status may move to `cancelled`. A paused download whose
//! resume finds no free slot goes back to `pending`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a download item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting in the queue.
    Pending,
    /// Transfer running.
    Downloading,
    /// Stopped by the user, partial data kept.
    Paused,
    /// Finished successfully.
    Completed,
    /// Transfer failed, may be retried.
    Failed,
    /// Stopped by the user, partial data removed.
    Cancelled,
    /// Re-queued after a failure.
    Retrying,
}

impl Status {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Cancelled)
    }

    /// Returns true if the queue may start a transfer for this status.
    pub fn is_startable(&self) -> bool {
        matches!(self, Status::Pending | Status::Retrying)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;

        match (self, next) {
            (Pending, Downloading) => true,
            (Downloading, Completed | Paused | Failed) => true,
            (Paused, Downloading | Pending) => true,
            (Failed, Retrying) => true,
            (Retrying, Downloading) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Lowercase name, as used in the persisted state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Downloading => "downloading",
            Status::Paused => "paused",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
            Status::Retrying => "retrying",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
