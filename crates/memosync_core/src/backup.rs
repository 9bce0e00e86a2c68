//! Local history snapshots and restore.
//!
//! History snapshots are full exports kept on the device for rollback.
//! They are never replicated, never rewritten once saved, and never
//! evicted: they accumulate until deleted explicitly.
//!
//! ## Usage
//!
//! ```ignore
//! use memosync_core::backup::{BackupManager, MemoryHistoryStore};
//!
//! let backups = BackupManager::new(entities, Arc::new(MemoryHistoryStore::new()), clock);
//! let saved = backups.save_history_snapshot()?;
//! // ... later
//! backups.restore_history(&saved.id)?;
//! ```

use crate::crypto::compute_checksum;
use crate::entity::EntityStore;
use crate::error::{CoreError, CoreResult};
use crate::snapshot::{SyncData, SyncSnapshot};
use crate::types::{Clock, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// A saved, immutable full export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    /// Snapshot id.
    pub id: String,
    /// When the snapshot was taken.
    pub created_at: Timestamp,
    /// SHA-256 of the serialized data, for display.
    pub checksum: String,
    /// The export.
    pub data: SyncData,
}

impl HistorySnapshot {
    /// Returns the metadata for this snapshot.
    #[must_use]
    pub fn metadata(&self) -> HistoryMetadata {
        HistoryMetadata {
            id: self.id.clone(),
            created_at: self.created_at,
            record_count: self.data.len(),
            checksum: self.checksum.clone(),
        }
    }
}

/// Metadata about a history snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMetadata {
    /// Snapshot id.
    pub id: String,
    /// When the snapshot was taken.
    pub created_at: Timestamp,
    /// Number of records.
    pub record_count: usize,
    /// SHA-256 of the serialized data.
    pub checksum: String,
}

/// Result of a restore operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreResult {
    /// Number of records written to the entity store.
    pub restored: usize,
}

/// Storage for history snapshots, separate from the entity store.
pub trait HistoryStore: Send + Sync {
    /// Persists a new snapshot. Fails if the id already exists.
    fn save(&self, snapshot: &HistorySnapshot) -> CoreResult<()>;

    /// Lists snapshots, newest first.
    fn list(&self) -> CoreResult<Vec<HistoryMetadata>>;

    /// Loads a snapshot by id.
    fn load(&self, id: &str) -> CoreResult<Option<HistorySnapshot>>;

    /// Deletes a snapshot. Returns false if it did not exist.
    fn delete(&self, id: &str) -> CoreResult<bool>;
}

fn newest_first(list: &mut [HistoryMetadata]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// In-memory history store.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    snapshots: RwLock<BTreeMap<String, HistorySnapshot>>,
}

impl MemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save(&self, snapshot: &HistorySnapshot) -> CoreResult<()> {
        let mut snapshots = self.snapshots.write();
        if snapshots.contains_key(&snapshot.id) {
            return Err(CoreError::storage(format!(
                "history snapshot {} already exists",
                snapshot.id
            )));
        }
        snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn list(&self) -> CoreResult<Vec<HistoryMetadata>> {
        let mut list: Vec<_> = self.snapshots.read().values().map(HistorySnapshot::metadata).collect();
        newest_first(&mut list);
        Ok(list)
    }

    fn load(&self, id: &str) -> CoreResult<Option<HistorySnapshot>> {
        Ok(self.snapshots.read().get(id).cloned())
    }

    fn delete(&self, id: &str) -> CoreResult<bool> {
        Ok(self.snapshots.write().remove(id).is_some())
    }
}

/// History store keeping one JSON file per snapshot in a directory.
#[derive(Debug)]
pub struct DirHistoryStore {
    dir: PathBuf,
}

impl DirHistoryStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> CoreResult<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(CoreError::history_not_found(id));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl HistoryStore for DirHistoryStore {
    fn save(&self, snapshot: &HistorySnapshot) -> CoreResult<()> {
        let path = self.path_for(&snapshot.id)?;
        let bytes = serde_json::to_vec(snapshot)?;
        // create_new keeps saved snapshots immutable
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn list(&self) -> CoreResult<Vec<HistoryMetadata>> {
        let mut list = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let snapshot: HistorySnapshot = serde_json::from_slice(&fs::read(&path)?)?;
            list.push(snapshot.metadata());
        }
        newest_first(&mut list);
        Ok(list)
    }

    fn load(&self, id: &str) -> CoreResult<Option<HistorySnapshot>> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> CoreResult<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exports, snapshots and restores the entity store.
pub struct BackupManager {
    entities: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
}

impl BackupManager {
    /// Creates a backup manager.
    pub fn new(
        entities: Arc<dyn EntityStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entities,
            history,
            clock,
        }
    }

    /// Exports every memo, tombstones and archived ones included.
    pub fn export_snapshot(&self) -> CoreResult<SyncData> {
        Ok(SyncData::partition(self.entities.get_all()?))
    }

    /// Assembles a sync snapshot of the current store, stamped now.
    pub fn build_sync_snapshot(&self, device_id: &str) -> CoreResult<SyncSnapshot> {
        Ok(SyncSnapshot::assemble(
            self.entities.get_all()?,
            device_id,
            self.clock.now_millis(),
        ))
    }

    /// Saves a timestamped copy of [`export_snapshot`](Self::export_snapshot).
    pub fn save_history_snapshot(&self) -> CoreResult<HistoryMetadata> {
        let data = self.export_snapshot()?;
        let checksum = compute_checksum(&serde_json::to_vec(&data)?);
        let snapshot = HistorySnapshot {
            id: Uuid::new_v4().to_string(),
            created_at: self.clock.now_millis(),
            checksum,
            data,
        };
        self.history.save(&snapshot)?;

        tracing::debug!(
            id = %snapshot.id,
            records = snapshot.data.len(),
            "saved history snapshot"
        );
        Ok(snapshot.metadata())
    }

    /// Lists saved history snapshots, newest first.
    pub fn list_history(&self) -> CoreResult<Vec<HistoryMetadata>> {
        self.history.list()
    }

    /// Loads a history snapshot.
    pub fn load_history(&self, id: &str) -> CoreResult<HistorySnapshot> {
        self.history
            .load(id)?
            .ok_or_else(|| CoreError::history_not_found(id))
    }

    /// Deletes a history snapshot.
    pub fn delete_history(&self, id: &str) -> CoreResult<()> {
        if self.history.delete(id)? {
            Ok(())
        } else {
            Err(CoreError::history_not_found(id))
        }
    }

    /// Replaces the whole entity store with `data`.
    ///
    /// Destructive: local records absent from `data` are gone afterwards.
    /// On failure the store keeps its previous contents.
    pub fn restore_snapshot(&self, data: SyncData) -> CoreResult<RestoreResult> {
        let memos = data.into_memos();
        let restored = memos.len();
        self.entities.replace_all(memos)?;

        tracing::info!(restored, "restored entity store from snapshot");
        Ok(RestoreResult { restored })
    }

    /// Restores the entity store from a saved history snapshot.
    pub fn restore_history(&self, id: &str) -> CoreResult<RestoreResult> {
        let snapshot = self.load_history(id)?;
        self.restore_snapshot(snapshot.data)
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Memo, MemoKind, MemoryEntityStore};
    use crate::types::ManualClock;

    fn manager(memos: Vec<Memo>) -> (BackupManager, Arc<MemoryEntityStore>, Arc<ManualClock>) {
        let entities = Arc::new(MemoryEntityStore::with_memos(memos));
        let clock = Arc::new(ManualClock::new(1_000));
        let manager = BackupManager::new(
            entities.clone(),
            Arc::new(MemoryHistoryStore::new()),
            clock.clone(),
        );
        (manager, entities, clock)
    }

    #[test]
    fn export_includes_tombstones_and_archived() {
        let mut deleted = Memo::new("a", "", MemoKind::Memo, 1);
        deleted.is_deleted = true;
        let mut archived = Memo::new("b", "", MemoKind::Todo, 1);
        archived.is_archived = true;

        let (manager, _, _) = manager(vec![deleted, archived]);
        let data = manager.export_snapshot().unwrap();
        assert_eq!(data.memos.len(), 1);
        assert_eq!(data.todos.len(), 1);
    }

    #[test]
    fn history_snapshots_accumulate() {
        let (manager, _, clock) = manager(vec![Memo::new("a", "", MemoKind::Memo, 1)]);

        let first = manager.save_history_snapshot().unwrap();
        clock.advance(10);
        let second = manager.save_history_snapshot().unwrap();

        let list = manager.list_history().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert_eq!(first.checksum.len(), 64);
    }

    #[test]
    fn restore_is_destructive() {
        let (manager, entities, _) = manager(vec![Memo::new("local", "", MemoKind::Memo, 1)]);

        let data = SyncData::partition(vec![
            Memo::new("x", "", MemoKind::Memo, 5),
            Memo::new("y", "", MemoKind::Whiteboard, 5),
        ]);
        let result = manager.restore_snapshot(data).unwrap();

        assert_eq!(result.restored, 2);
        assert!(entities.get("local").unwrap().is_none());
        assert!(entities.get("y").unwrap().is_some());
    }

    /// Store whose next `bulk_save` fails; uses the default `replace_all`.
    struct FlakyStore {
        inner: MemoryEntityStore,
        fail_next_save: std::sync::atomic::AtomicBool,
    }

    impl EntityStore for FlakyStore {
        fn get(&self, id: &str) -> CoreResult<Option<Memo>> {
            self.inner.get(id)
        }
        fn get_all(&self) -> CoreResult<Vec<Memo>> {
            self.inner.get_all()
        }
        fn upsert(&self, memo: Memo) -> CoreResult<()> {
            self.inner.upsert(memo)
        }
        fn bulk_save(&self, memos: Vec<Memo>) -> CoreResult<()> {
            if self.fail_next_save.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(CoreError::storage("disk full"));
            }
            self.inner.bulk_save(memos)
        }
        fn delete(&self, id: &str) -> CoreResult<()> {
            self.inner.delete(id)
        }
        fn clear(&self) -> CoreResult<()> {
            self.inner.clear()
        }
    }

    #[test]
    fn failed_restore_keeps_previous_contents() {
        let entities = Arc::new(FlakyStore {
            inner: MemoryEntityStore::with_memos(vec![Memo::new("local", "", MemoKind::Memo, 1)]),
            fail_next_save: std::sync::atomic::AtomicBool::new(true),
        });
        let manager = BackupManager::new(
            entities.clone(),
            Arc::new(MemoryHistoryStore::new()),
            Arc::new(ManualClock::new(1_000)),
        );

        let data = SyncData::partition(vec![Memo::new("x", "", MemoKind::Memo, 5)]);
        let err = manager.restore_snapshot(data).unwrap_err();

        assert!(matches!(err, CoreError::Storage { .. }));
        assert!(entities.get("local").unwrap().is_some());
        assert!(entities.get("x").unwrap().is_none());
    }

    #[test]
    fn restore_history_rolls_back() {
        let (manager, entities, _) = manager(vec![Memo::new("a", "v1", MemoKind::Memo, 1)]);
        let saved = manager.save_history_snapshot().unwrap();

        entities.upsert(Memo::new("a", "v2", MemoKind::Memo, 2)).unwrap();
        entities.upsert(Memo::new("b", "", MemoKind::Memo, 2)).unwrap();

        manager.restore_history(&saved.id).unwrap();
        assert_eq!(entities.get("a").unwrap().unwrap().content, "v1");
        assert!(entities.get("b").unwrap().is_none());
    }

    #[test]
    fn delete_history() {
        let (manager, _, _) = manager(vec![]);
        let saved = manager.save_history_snapshot().unwrap();

        manager.delete_history(&saved.id).unwrap();
        assert!(manager.list_history().unwrap().is_empty());
        assert!(matches!(
            manager.delete_history(&saved.id),
            Err(CoreError::HistoryNotFound { .. })
        ));
    }

    #[test]
    fn dir_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirHistoryStore::open(dir.path().join("history")).unwrap();

        let snapshot = HistorySnapshot {
            id: Uuid::new_v4().to_string(),
            created_at: 7,
            checksum: "abc".into(),
            data: SyncData::partition(vec![Memo::new("a", "", MemoKind::Todo, 1)]),
        };
        store.save(&snapshot).unwrap();

        assert_eq!(store.load(&snapshot.id).unwrap(), Some(snapshot.clone()));
        assert_eq!(store.list().unwrap()[0].record_count, 1);

        // saved snapshots are immutable
        assert!(store.save(&snapshot).is_err());

        assert!(store.delete(&snapshot.id).unwrap());
        assert!(!store.delete(&snapshot.id).unwrap());
        assert!(store.load(&snapshot.id).unwrap().is_none());
    }

    #[test]
    fn dir_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirHistoryStore::open(dir.path()).unwrap();
        assert!(store.load("../escape").is_err());
    }
}
