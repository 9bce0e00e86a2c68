//! Sync orchestrator.
//!
//! Picks the adapter for the active config, runs at most one pass at a
//! time, writes results back into the entity store and tracks the conflict
//! state machine.
//!
//! ```text
//!             perform_sync                 resolve_conflict
//!   Synced ───────────────▶ ConflictPending ───────────────▶ Resolved
//!     ▲                                                         │
//!     └────────────────────── perform_sync ─────────────────────┘
//! ```

use crate::adapters::{AdapterFactory, SyncAdapter, SyncContext};
use crate::config::{ProviderKind, SyncConfig};
use crate::conflict::{ConflictChoice, ConflictState, SyncConflict};
use crate::error::{SyncError, SyncResult};
use crate::state::SyncStateStore;
use memosync_core::{merge, BackupManager, Clock, EntityStore, HistoryStore, Memo, Timestamp};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Holds the single-pass flag; clears it on drop.
///
/// Dropping a pass future mid-await releases the flag too.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Coordinates sync passes for one device.
pub struct SyncOrchestrator {
    entities: Arc<dyn EntityStore>,
    state: Arc<dyn SyncStateStore>,
    clock: Arc<dyn Clock>,
    backups: BackupManager,
    factory: Arc<dyn AdapterFactory>,
    config: RwLock<SyncConfig>,
    conflict: RwLock<ConflictState>,
    in_flight: AtomicBool,
}

impl SyncOrchestrator {
    /// Creates an orchestrator, loading the saved config from `state`.
    pub fn new(
        entities: Arc<dyn EntityStore>,
        state: Arc<dyn SyncStateStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        factory: Arc<dyn AdapterFactory>,
    ) -> SyncResult<Self> {
        let config = state.load_config()?;
        let backups = BackupManager::new(Arc::clone(&entities), history, Arc::clone(&clock));
        Ok(Self {
            entities,
            state,
            clock,
            backups,
            factory,
            config: RwLock::new(config),
            conflict: RwLock::new(ConflictState::Synced),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Returns the active config.
    pub fn config(&self) -> SyncConfig {
        self.config.read().clone()
    }

    /// Validates, persists and activates `config`.
    pub fn set_config(&self, config: SyncConfig) -> SyncResult<()> {
        config.validate()?;
        self.state.save_config(&config)?;
        info!(provider = %config.provider(), "sync provider configured");
        *self.config.write() = config;
        Ok(())
    }

    /// Returns the conflict state.
    pub fn conflict_state(&self) -> ConflictState {
        *self.conflict.read()
    }

    /// Returns true while a pass is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns when the last pass succeeded.
    pub fn last_success_at(&self) -> SyncResult<Option<Timestamp>> {
        self.state.last_success_at()
    }

    /// Returns the backup manager over the same entity store.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Returns this device's id.
    pub fn device_id(&self) -> SyncResult<String> {
        self.state.device_id()
    }

    /// Runs one sync pass.
    ///
    /// The adapter's result is merged into the store as it stands when the
    /// adapter returns, so edits saved during the pass are kept unless the
    /// adapter brought back something strictly newer.
    ///
    /// Returns the full store contents afterwards, tombstones included.
    /// With sync disabled, or while another pass is running, returns
    /// `entities` untouched.
    ///
    /// # Errors
    ///
    /// [`SyncError::Conflict`] when the cloud copy needs a user decision;
    /// any other error aborts the pass without moving the watermark.
    pub async fn perform_sync(&self, entities: Vec<Memo>) -> SyncResult<Vec<Memo>> {
        let config = self.config();
        let Some(adapter) = self.factory.create(&config)? else {
            debug!("sync disabled, skipping pass");
            return Ok(entities);
        };

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("sync already in progress, skipping pass");
            return Ok(entities);
        };

        self.run_pass(adapter.as_ref(), entities).await
    }

    /// Settles a conflict raised by [`perform_sync`](Self::perform_sync).
    ///
    /// `UseCloud` replaces the local store with the cloud snapshot.
    /// `UseLocal` accepts the cloud stamp as seen and reruns the pass so
    /// the local snapshot overwrites the cloud copy.
    ///
    /// # Errors
    ///
    /// [`SyncError::Busy`] if a pass is running.
    pub async fn resolve_conflict(
        &self,
        choice: ConflictChoice,
        conflict: &SyncConflict,
    ) -> SyncResult<Vec<Memo>> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return Err(SyncError::Busy);
        };

        let config = self.config();
        let provider = config.provider();
        if provider == ProviderKind::None {
            return Err(SyncError::config("cannot resolve a conflict with sync disabled"));
        }
        let cloud_stamp = conflict.cloud_updated_at();
        info!(?choice, cloud_stamp, "resolving sync conflict");

        let result = match choice {
            ConflictChoice::UseCloud => {
                let restored = self.backups.restore_snapshot(conflict.cloud.data.clone())?;
                self.state.set_last_sync_time(provider, cloud_stamp)?;
                self.state.set_last_success_at(self.clock.now_millis())?;
                debug!(restored = restored.restored, "local store replaced by cloud snapshot");
                self.entities.get_all()?
            }
            ConflictChoice::UseLocal => {
                self.state.set_last_sync_time(provider, cloud_stamp)?;
                let adapter = self
                    .factory
                    .create(&config)?
                    .ok_or_else(|| SyncError::config("no adapter for active provider"))?;
                let local = self.entities.get_all()?;
                self.run_pass(adapter.as_ref(), local).await?
            }
        };

        *self.conflict.write() = ConflictState::Resolved;
        Ok(result)
    }

    async fn run_pass(&self, adapter: &dyn SyncAdapter, local: Vec<Memo>) -> SyncResult<Vec<Memo>> {
        let provider = adapter.provider();
        let ctx = SyncContext {
            state: self.state.as_ref(),
            clock: self.clock.as_ref(),
            backups: &self.backups,
        };
        debug!(%provider, local = local.len(), "starting sync pass");

        let outcome = match adapter.sync(&ctx, local).await {
            Ok(outcome) => outcome,
            Err(SyncError::Conflict(conflict)) => {
                *self.conflict.write() = ConflictState::ConflictPending;
                warn!(%provider, "sync paused on conflict");
                return Err(SyncError::Conflict(conflict));
            }
            Err(e) => {
                warn!(%provider, error = %e, "sync pass failed");
                return Err(e);
            }
        };

        if let Some(updated) = outcome.updated_config {
            self.state.save_config(&updated)?;
            *self.config.write() = updated;
            debug!(%provider, "persisted provider-assigned settings");
        }

        // The store may have moved while the adapter was awaiting I/O.
        let current = self.entities.get_all()?;
        self.entities.bulk_save(merge(&current, &outcome.entities))?;
        self.state.set_last_success_at(self.clock.now_millis())?;
        *self.conflict.write() = ConflictState::Synced;

        let all = self.entities.get_all()?;
        info!(%provider, total = all.len(), "sync pass complete");
        Ok(all)
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("provider", &self.config.read().provider())
            .field("conflict", &self.conflict_state())
            .field("in_flight", &self.is_syncing())
            .finish_non_exhaustive()
    }
}
