//! Memo builders, provider configs and a per-device harness.

use memosync_core::{
    merge::sort_newest_first, Clock, DirHistoryStore, EntityStore, HistoryStore, ManualClock, Memo, MemoKind,
    MemoryEntityStore, MemoryHistoryStore, Timestamp,
};
use memosync_sync_engine::{
    DefaultAdapterFactory, DeltaRestSettings, EncryptedBlobSettings, FileSyncStateStore, GistSettings,
    HttpClient, MemorySyncStateStore, SingleFileSettings, SyncConfig, SyncOrchestrator, SyncResult,
    SyncStateStore,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Base URL the delta-REST fixtures point at.
pub const REST_URL: &str = "https://rest.test/v1";
/// Base URL the single-file fixtures point at.
pub const DAV_URL: &str = "https://dav.test/files";
/// API base the gist and encrypted-blob fixtures point at.
pub const API_BASE: &str = "https://api.test";

/// A plain memo stamped `at`.
pub fn memo(id: &str, at: Timestamp) -> Memo {
    Memo::new(id, format!("memo {id}"), MemoKind::Memo, at)
}

/// A todo memo stamped `at`.
pub fn todo(id: &str, at: Timestamp) -> Memo {
    Memo::new(id, format!("todo {id}"), MemoKind::Todo, at)
}

/// A whiteboard stamped `at`.
pub fn whiteboard(id: &str, at: Timestamp) -> Memo {
    let mut board = Memo::new(id, "", MemoKind::Whiteboard, at);
    board.sketch_data = Some(format!("{{\"strokes\":[],\"id\":\"{id}\"}}"));
    board
}

/// A tombstone stamped `at`.
pub fn tombstone(id: &str, at: Timestamp) -> Memo {
    let mut memo = memo(id, at);
    memo.is_deleted = true;
    memo
}

/// Delta-REST config against [`REST_URL`].
pub fn delta_rest_config(api_key: &str) -> SyncConfig {
    SyncConfig::DeltaRest(DeltaRestSettings::new(REST_URL, api_key))
}

/// Single-file config against [`DAV_URL`].
pub fn single_file_config(username: &str, password: &str) -> SyncConfig {
    SyncConfig::SingleFile(SingleFileSettings::new(DAV_URL, username, password))
}

/// Gist config against [`API_BASE`].
pub fn gist_config(token: &str, gist_id: Option<&str>) -> SyncConfig {
    let mut settings = GistSettings::new(token).with_api_base(API_BASE);
    if let Some(id) = gist_id {
        settings = settings.with_gist_id(id);
    }
    SyncConfig::Gist(settings)
}

/// Encrypted-blob config against [`API_BASE`].
pub fn encrypted_blob_config(token: &str, passphrase: &str) -> SyncConfig {
    SyncConfig::EncryptedBlob(
        EncryptedBlobSettings::new(token, "owner", "vault", passphrase).with_api_base(API_BASE),
    )
}

/// One simulated device: stores, clock and orchestrator.
pub struct TestDevice {
    /// Local entity store.
    pub entities: Arc<MemoryEntityStore>,
    /// Persisted sync state.
    pub state: Arc<dyn SyncStateStore>,
    /// Local history snapshots.
    pub history: Arc<dyn HistoryStore>,
    /// Device clock.
    pub clock: Arc<ManualClock>,
    /// The orchestrator under test.
    pub orchestrator: SyncOrchestrator,
    /// Backing directory for file-based state (kept alive for cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDevice {
    /// Creates a device with in-memory state, talking to `http`.
    pub fn new(config: SyncConfig, http: Arc<dyn HttpClient>, now: Timestamp) -> Self {
        Self::build(
            Arc::new(MemorySyncStateStore::with_config(config)),
            Arc::new(MemoryHistoryStore::new()),
            http,
            now,
            None,
        )
    }

    /// Creates a device whose sync state and history live in a temp dir.
    pub fn with_files(config: SyncConfig, http: Arc<dyn HttpClient>, now: Timestamp) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let state = FileSyncStateStore::open(temp_dir.path().join("sync-state.json"))
            .expect("Failed to open state file");
        state.save_config(&config).expect("Failed to save config");
        let history =
            DirHistoryStore::open(temp_dir.path().join("history")).expect("Failed to open history dir");
        Self::build(Arc::new(state), Arc::new(history), http, now, Some(temp_dir))
    }

    fn build(
        state: Arc<dyn SyncStateStore>,
        history: Arc<dyn HistoryStore>,
        http: Arc<dyn HttpClient>,
        now: Timestamp,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let entities = Arc::new(MemoryEntityStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let orchestrator = SyncOrchestrator::new(
            entities.clone(),
            Arc::clone(&state),
            Arc::clone(&history),
            clock.clone(),
            Arc::new(DefaultAdapterFactory::new(http)),
        )
        .expect("Failed to create orchestrator");
        Self {
            entities,
            state,
            history,
            clock,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }

    /// Stores `memo` locally.
    pub fn put(&self, memo: Memo) {
        self.entities.upsert(memo).expect("Failed to store memo");
    }

    /// Edits a memo's content at the current clock time.
    pub fn edit(&self, id: &str, content: &str) -> Memo {
        let mut memo = self.get(id).expect("No such memo");
        memo.set_content(content, self.clock.now_millis());
        self.put(memo.clone());
        memo
    }

    /// Deletes a memo locally, leaving a tombstone.
    pub fn delete(&self, id: &str) -> Memo {
        let mut memo = self.get(id).expect("No such memo");
        memo.mark_deleted(self.clock.now_millis());
        self.put(memo.clone());
        memo
    }

    /// Returns a memo by id.
    pub fn get(&self, id: &str) -> Option<Memo> {
        self.entities.get(id).expect("Failed to read memo")
    }

    /// Returns every local memo, newest first.
    pub fn memos(&self) -> Vec<Memo> {
        let mut memos = self.entities.get_all().expect("Failed to read memos");
        sort_newest_first(&mut memos);
        memos
    }

    /// Moves the device clock forward.
    pub fn advance(&self, millis: Timestamp) -> Timestamp {
        self.clock.advance(millis)
    }

    /// Runs a sync pass over the whole local store.
    pub async fn sync(&self) -> SyncResult<Vec<Memo>> {
        let local = self.entities.get_all().expect("Failed to read memos");
        self.orchestrator.perform_sync(local).await
    }
}
