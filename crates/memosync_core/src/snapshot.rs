//! Full-state snapshots.

use crate::entity::{Memo, MemoKind};
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A full export of every memo, partitioned by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncData {
    /// Notes.
    #[serde(default)]
    pub memos: Vec<Memo>,
    /// Checklists.
    #[serde(default)]
    pub todos: Vec<Memo>,
    /// Sketch canvases.
    #[serde(default)]
    pub whiteboards: Vec<Memo>,
}

impl SyncData {
    /// Partitions `memos` by kind. Tombstones and archived memos are kept.
    #[must_use]
    pub fn partition(memos: Vec<Memo>) -> Self {
        let mut data = Self::default();
        for memo in memos {
            match memo.kind {
                MemoKind::Memo => data.memos.push(memo),
                MemoKind::Todo => data.todos.push(memo),
                MemoKind::Whiteboard => data.whiteboards.push(memo),
            }
        }
        data
    }

    /// Returns the union of all three partitions.
    #[must_use]
    pub fn into_memos(self) -> Vec<Memo> {
        let mut all = self.memos;
        all.extend(self.todos);
        all.extend(self.whiteboards);
        all
    }

    /// Total number of records across partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memos.len() + self.todos.len() + self.whiteboards.len()
    }

    /// Returns true if every partition is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot metadata.
///
/// `updated_at` is when the snapshot was assembled, not the newest memo
/// timestamp. It is compared against the last-sync watermark for conflict
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    /// Format version.
    pub version: u32,
    /// Assembly time.
    pub updated_at: Timestamp,
    /// Device that assembled the snapshot.
    pub device_id: String,
}

/// Metadata plus data, as exchanged with the encrypted-blob backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Metadata.
    pub meta: SnapshotMeta,
    /// Partitioned export.
    pub data: SyncData,
}

impl SyncSnapshot {
    /// Assembles a snapshot of `memos` stamped at `now`.
    #[must_use]
    pub fn assemble(memos: Vec<Memo>, device_id: impl Into<String>, now: Timestamp) -> Self {
        Self {
            meta: SnapshotMeta {
                version: SNAPSHOT_VERSION,
                updated_at: now,
                device_id: device_id.into(),
            },
            data: SyncData::partition(memos),
        }
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses from JSON, rejecting snapshots from a newer format.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.meta.version > SNAPSHOT_VERSION {
            return Err(CoreError::invalid_snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.meta.version
            )));
        }
        Ok(snapshot)
    }
}
