//! Snapshot-level conflict detection for the encrypted-blob backend.
//!
//! A cloud snapshot stamped later than this device's watermark means
//! another device wrote since we last synced. The engine never merges the
//! two in that case: the user picks one side with [`ConflictChoice`].

use memosync_core::{SyncSnapshot, Timestamp};
use serde::{Deserialize, Serialize};

/// Conflict status tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictState {
    /// No conflict outstanding.
    #[default]
    Synced,
    /// A conflict was detected and awaits a choice.
    ConflictPending,
    /// The last conflict was resolved.
    Resolved,
}

impl ConflictState {
    /// Returns true unless a conflict is waiting for the user.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ConflictState::ConflictPending)
    }
}

/// Which side wins a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Keep the device's data and overwrite the cloud copy.
    UseLocal,
    /// Replace the device's data with the cloud copy.
    UseCloud,
}

/// Both sides of a detected conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflict {
    /// Snapshot assembled from the local store.
    pub local: SyncSnapshot,
    /// Decrypted cloud snapshot.
    pub cloud: SyncSnapshot,
}

impl SyncConflict {
    /// Returns the cloud snapshot's stamp.
    pub fn cloud_updated_at(&self) -> Timestamp {
        self.cloud.meta.updated_at
    }
}

/// Outcome of a conflict check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictVerdict {
    /// Safe to overwrite the cloud copy.
    Clear,
    /// The cloud copy is newer than the watermark.
    Conflict,
}

/// Compares a cloud snapshot against the local watermark.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    /// Checks `cloud` against `last_sync`; a missing watermark counts as 0.
    pub fn check(last_sync: Option<Timestamp>, cloud: &SyncSnapshot) -> ConflictVerdict {
        if cloud.meta.updated_at > last_sync.unwrap_or(0) {
            ConflictVerdict::Conflict
        } else {
            ConflictVerdict::Clear
        }
    }
}
