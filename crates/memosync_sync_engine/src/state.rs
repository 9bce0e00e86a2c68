//! Persisted local sync state.
//!
//! Per-provider watermarks, the device id, the active provider config and
//! the time of the last successful pass. All of it lives on the device and
//! is never replicated.

use crate::config::{ProviderKind, SyncConfig};
use crate::error::{SyncError, SyncResult};
use memosync_core::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Storage for the engine's own bookkeeping.
pub trait SyncStateStore: Send + Sync {
    /// Returns the watermark for `provider`, or `None` if it never synced.
    fn last_sync_time(&self, provider: ProviderKind) -> SyncResult<Option<Timestamp>>;

    /// Stores the watermark for `provider`.
    fn set_last_sync_time(&self, provider: ProviderKind, at: Timestamp) -> SyncResult<()>;

    /// Returns the device id, generating and persisting one on first use.
    fn device_id(&self) -> SyncResult<String>;

    /// Loads the saved provider config (`SyncConfig::None` if nothing saved).
    fn load_config(&self) -> SyncResult<SyncConfig>;

    /// Saves the provider config.
    fn save_config(&self, config: &SyncConfig) -> SyncResult<()>;

    /// Returns when the last pass completed successfully.
    fn last_success_at(&self) -> SyncResult<Option<Timestamp>>;

    /// Records a successful pass.
    fn set_last_success_at(&self, at: Timestamp) -> SyncResult<()>;
}

/// On-disk shape of the sync state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Watermark per provider name.
    #[serde(default)]
    pub last_sync: BTreeMap<String, Timestamp>,
    /// Device id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Active config.
    #[serde(default)]
    pub config: SyncConfig,
    /// Last successful pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<Timestamp>,
}

impl PersistedState {
    fn ensure_device_id(&mut self) -> String {
        self.device_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }
}

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemorySyncStateStore {
    state: RwLock<PersistedState>,
}

impl MemorySyncStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `config`.
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            state: RwLock::new(PersistedState {
                config,
                ..PersistedState::default()
            }),
        }
    }

    /// Returns a copy of the whole state.
    pub fn snapshot(&self) -> PersistedState {
        self.state.read().clone()
    }
}

impl SyncStateStore for MemorySyncStateStore {
    fn last_sync_time(&self, provider: ProviderKind) -> SyncResult<Option<Timestamp>> {
        Ok(self.state.read().last_sync.get(provider.as_str()).copied())
    }

    fn set_last_sync_time(&self, provider: ProviderKind, at: Timestamp) -> SyncResult<()> {
        self.state
            .write()
            .last_sync
            .insert(provider.as_str().to_string(), at);
        Ok(())
    }

    fn device_id(&self) -> SyncResult<String> {
        Ok(self.state.write().ensure_device_id())
    }

    fn load_config(&self) -> SyncResult<SyncConfig> {
        Ok(self.state.read().config.clone())
    }

    fn save_config(&self, config: &SyncConfig) -> SyncResult<()> {
        self.state.write().config = config.clone();
        Ok(())
    }

    fn last_success_at(&self) -> SyncResult<Option<Timestamp>> {
        Ok(self.state.read().last_success_at)
    }

    fn set_last_success_at(&self, at: Timestamp) -> SyncResult<()> {
        self.state.write().last_success_at = Some(at);
        Ok(())
    }
}

/// State store backed by a single JSON file.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new state.
#[derive(Debug)]
pub struct FileSyncStateStore {
    path: PathBuf,
    state: RwLock<PersistedState>,
}

impl FileSyncStateStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::state(format!("corrupt state file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(SyncError::state(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> SyncResult<R> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        let out = f(&mut next);
        if next != *guard {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(out)
    }

    fn persist(&self, state: &PersistedState) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| SyncError::state(format!("encode state: {e}")))?;
        let io_err = |e: std::io::Error| SyncError::state(format!("{}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl SyncStateStore for FileSyncStateStore {
    fn last_sync_time(&self, provider: ProviderKind) -> SyncResult<Option<Timestamp>> {
        Ok(self.state.read().last_sync.get(provider.as_str()).copied())
    }

    fn set_last_sync_time(&self, provider: ProviderKind, at: Timestamp) -> SyncResult<()> {
        self.update(|s| {
            s.last_sync.insert(provider.as_str().to_string(), at);
        })
    }

    fn device_id(&self) -> SyncResult<String> {
        if let Some(id) = &self.state.read().device_id {
            return Ok(id.clone());
        }
        self.update(|s| s.ensure_device_id())
    }

    fn load_config(&self) -> SyncResult<SyncConfig> {
        Ok(self.state.read().config.clone())
    }

    fn save_config(&self, config: &SyncConfig) -> SyncResult<()> {
        self.update(|s| s.config = config.clone())
    }

    fn last_success_at(&self) -> SyncResult<Option<Timestamp>> {
        Ok(self.state.read().last_success_at)
    }

    fn set_last_success_at(&self, at: Timestamp) -> SyncResult<()> {
        self.update(|s| s.last_success_at = Some(at))
    }
}
