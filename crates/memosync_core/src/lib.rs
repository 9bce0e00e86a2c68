//! # memosync core
//!
//! Local data model and pure sync primitives for memosync.
//!
//! This crate provides:
//! - The memo record and the local entity store trait
//! - Last-write-wins merge of memo collections
//! - Full-state snapshots and local history backups
//! - Password-based payload encryption
//! - An injectable clock
//!
//! ## Key Invariants
//!
//! - `updated_at` is the sole authority for merge precedence
//! - Merge never drops a record; deletions travel as tombstones
//! - Decryption failures are opaque

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
pub mod crypto;
pub mod entity;
mod error;
pub mod merge;
pub mod snapshot;
mod types;

pub use backup::{
    BackupManager, DirHistoryStore, HistoryMetadata, HistorySnapshot, HistoryStore,
    MemoryHistoryStore, RestoreResult,
};
pub use crypto::{compute_checksum, decrypt, encrypt, EncryptedPayload};
pub use entity::{
    visible, EntityStore, Memo, MemoKind, MemoryEntityStore, Priority, ReminderRepeat, TodoItem,
};
pub use error::{CoreError, CoreResult};
pub use merge::{merge, merge_report, MergeReport};
pub use snapshot::{SnapshotMeta, SyncData, SyncSnapshot, SNAPSHOT_VERSION};
pub use types::{Clock, ManualClock, SystemClock, Timestamp};
