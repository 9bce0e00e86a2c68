//! # memosync Sync Engine
//!
//! Provider adapters, conflict gate and orchestrator for memosync.
//!
//! This crate provides:
//! - Typed provider configuration
//! - Four backend adapters (delta-REST, single-file, gist, encrypted blob)
//! - Snapshot-level conflict detection with an explicit user choice
//! - Persisted watermarks and device identity
//! - An HTTP client abstraction with a `reqwest` implementation
//!
//! ## Architecture
//!
//! Every pass is **fetch, then merge, then push**, strictly in that order:
//! 1. The adapter fetches the remote state (or the rows that changed)
//! 2. Local and remote are merged last-write-wins, except for the
//!    encrypted blob, which replaces wholesale behind the conflict gate
//! 3. Whatever the remote is missing is pushed back
//! 4. The merged result is written into the local entity store
//!
//! ## Key Invariants
//!
//! - At most one pass runs at a time
//! - A failed push never advances a watermark
//! - The engine never retries on its own
//! - Passphrases never leave the device

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
mod config;
mod conflict;
mod error;
mod http;
mod orchestrator;
mod state;
mod transport;

pub use adapters::{AdapterFactory, AdapterOutcome, DefaultAdapterFactory, SyncAdapter, SyncContext};
pub use config::{
    DeltaRestSettings, EncryptedBlobSettings, GistSettings, ProviderKind, SingleFileSettings,
    SyncConfig, DEFAULT_API_BASE,
};
pub use conflict::{ConflictChoice, ConflictDetector, ConflictState, ConflictVerdict, SyncConflict};
pub use error::{SyncError, SyncResult};
pub use http::{basic_auth, bearer, ReqwestClient};
pub use orchestrator::SyncOrchestrator;
pub use state::{FileSyncStateStore, MemorySyncStateStore, PersistedState, SyncStateStore};
pub use transport::{HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient};
