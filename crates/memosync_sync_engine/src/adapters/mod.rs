//! Provider adapters.
//!
//! Each adapter owns the wire protocol of one backend. An adapter takes the
//! full local entity list, talks to its backend and hands back the entities
//! the local store should hold afterwards. Watermarks are read and written
//! through the [`SyncContext`].
//!
//! | Provider         | Strategy                                        |
//! |------------------|-------------------------------------------------|
//! | `delta-rest`     | fetch rows newer than the watermark, push delta |
//! | `single-file`    | GET whole document, merge, PUT if stale         |
//! | `gist`           | same as single-file, inside a gist              |
//! | `encrypted-blob` | whole-snapshot replace behind a conflict gate   |

mod delta_rest;
mod encrypted_blob;
mod gist;
mod single_file;

pub use delta_rest::DeltaRestAdapter;
pub use encrypted_blob::EncryptedBlobAdapter;
pub use gist::GistAdapter;
pub use single_file::SingleFileAdapter;

use crate::config::{ProviderKind, SyncConfig};
use crate::error::SyncResult;
use crate::http::ReqwestClient;
use crate::state::SyncStateStore;
use crate::transport::HttpClient;
use async_trait::async_trait;
use memosync_core::{BackupManager, Clock, Memo};
use std::sync::Arc;

/// Collaborators an adapter may use during a pass.
pub struct SyncContext<'a> {
    /// Watermarks and device id.
    pub state: &'a dyn SyncStateStore,
    /// Time source.
    pub clock: &'a dyn Clock,
    /// Local history snapshots.
    pub backups: &'a BackupManager,
}

/// What an adapter hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOutcome {
    /// Entities the local store should hold after the pass.
    pub entities: Vec<Memo>,
    /// Settings the backend assigned during the pass (e.g. a new gist id).
    pub updated_config: Option<SyncConfig>,
}

impl AdapterOutcome {
    /// An outcome without config changes.
    pub fn entities(entities: Vec<Memo>) -> Self {
        Self {
            entities,
            updated_config: None,
        }
    }
}

/// One backend's sync pass.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// The provider this adapter speaks to.
    fn provider(&self) -> ProviderKind;

    /// Runs one fetch, merge and push pass.
    async fn sync(&self, ctx: &SyncContext<'_>, local: Vec<Memo>) -> SyncResult<AdapterOutcome>;
}

/// Builds the adapter for a config.
pub trait AdapterFactory: Send + Sync {
    /// Returns the adapter for `config`, or `None` when sync is disabled.
    fn create(&self, config: &SyncConfig) -> SyncResult<Option<Box<dyn SyncAdapter>>>;
}

/// Builds the real adapters over a shared HTTP client.
#[derive(Clone)]
pub struct DefaultAdapterFactory {
    http: Arc<dyn HttpClient>,
}

impl DefaultAdapterFactory {
    /// Creates a factory over `http`.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Creates a factory over a default [`ReqwestClient`].
    pub fn with_reqwest() -> SyncResult<Self> {
        Ok(Self::new(Arc::new(ReqwestClient::new()?)))
    }
}

impl std::fmt::Debug for DefaultAdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAdapterFactory").finish_non_exhaustive()
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn create(&self, config: &SyncConfig) -> SyncResult<Option<Box<dyn SyncAdapter>>> {
        config.validate()?;
        let http = Arc::clone(&self.http);
        let adapter: Box<dyn SyncAdapter> = match config {
            SyncConfig::None => return Ok(None),
            SyncConfig::DeltaRest(s) => Box::new(DeltaRestAdapter::new(s.clone(), http)),
            SyncConfig::SingleFile(s) => Box::new(SingleFileAdapter::new(s.clone(), http)),
            SyncConfig::Gist(s) => Box::new(GistAdapter::new(s.clone(), http)),
            SyncConfig::EncryptedBlob(s) => Box::new(EncryptedBlobAdapter::new(s.clone(), http)),
        };
        Ok(Some(adapter))
    }
}

/// Joins a base URL and a path segment with exactly one slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parses a JSON entity array; blank input is an empty collection.
pub(crate) fn parse_entities(body: &[u8]) -> SyncResult<Vec<Memo>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(body).map_err(|e| {
        crate::error::SyncError::protocol(format!("remote entities are not a memo array: {e}"))
    })
}
