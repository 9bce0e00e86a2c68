//! # memosync Testkit
//!
//! Test utilities for memosync.
//!
//! This crate provides:
//! - Memo builders and a per-device test harness
//! - Property-based generators using proptest
//! - In-process fakes of every supported backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memosync_testkit::prelude::*;
//!
//! let backend = Arc::new(FakeRestBackend::new("key"));
//! let device = TestDevice::new(delta_rest_config("key"), backend.clone(), 1_000);
//! device.put(memo("a", 10));
//! device.sync().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fakes;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fakes::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fakes::*;
pub use fixtures::*;
pub use generators::*;
