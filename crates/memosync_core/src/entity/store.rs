//! Local entity store.

use crate::entity::Memo;
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Durable local store of memos keyed by id.
///
/// Holds every record, tombstones and archived ones included. The sync
/// engine only reads whole snapshots from it and writes merged snapshots
/// back; it never keeps references across a pass.
pub trait EntityStore: Send + Sync {
    /// Gets a memo by id.
    fn get(&self, id: &str) -> CoreResult<Option<Memo>>;

    /// Returns every stored memo.
    fn get_all(&self) -> CoreResult<Vec<Memo>>;

    /// Inserts or replaces a single memo.
    fn upsert(&self, memo: Memo) -> CoreResult<()>;

    /// Inserts or replaces a batch of memos.
    fn bulk_save(&self, memos: Vec<Memo>) -> CoreResult<()>;

    /// Physically removes a memo. Only used by local maintenance, never by merge.
    fn delete(&self, id: &str) -> CoreResult<()>;

    /// Removes everything.
    fn clear(&self) -> CoreResult<()>;

    /// Replaces the whole contents with `memos`.
    ///
    /// The default clears and refills the store. If the refill fails it
    /// writes the previous contents back before returning the error, so a
    /// failed replace never leaves the store empty. Stores that can swap
    /// their contents in one step should override this.
    fn replace_all(&self, memos: Vec<Memo>) -> CoreResult<()> {
        let previous = self.get_all()?;
        self.clear()?;
        if let Err(e) = self.bulk_save(memos) {
            self.clear()?;
            self.bulk_save(previous)?;
            return Err(e);
        }
        Ok(())
    }
}

/// An in-memory entity store.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    memos: RwLock<BTreeMap<String, Memo>>,
}

impl MemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `memos`.
    #[must_use]
    pub fn with_memos(memos: Vec<Memo>) -> Self {
        let store = Self::new();
        {
            let mut map = store.memos.write();
            for memo in memos {
                map.insert(memo.id.clone(), memo);
            }
        }
        store
    }

    /// Returns the number of stored memos.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memos.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memos.read().is_empty()
    }
}

impl EntityStore for MemoryEntityStore {
    fn get(&self, id: &str) -> CoreResult<Option<Memo>> {
        Ok(self.memos.read().get(id).cloned())
    }

    fn get_all(&self) -> CoreResult<Vec<Memo>> {
        Ok(self.memos.read().values().cloned().collect())
    }

    fn upsert(&self, memo: Memo) -> CoreResult<()> {
        self.memos.write().insert(memo.id.clone(), memo);
        Ok(())
    }

    fn bulk_save(&self, memos: Vec<Memo>) -> CoreResult<()> {
        let mut map = self.memos.write();
        for memo in memos {
            map.insert(memo.id.clone(), memo);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> CoreResult<()> {
        self.memos.write().remove(id);
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        self.memos.write().clear();
        Ok(())
    }

    fn replace_all(&self, memos: Vec<Memo>) -> CoreResult<()> {
        let next = memos.into_iter().map(|m| (m.id.clone(), m)).collect();
        *self.memos.write() = next;
        Ok(())
    }
}
