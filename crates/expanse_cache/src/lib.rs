//! Persistent, cached storage for macro expansion range maps.
//!
//! Expansions are keyed by a [`Fingerprint`] mixed from the macro call and its
//! definition and stored as versioned binary records through a [`BlobStore`].
//! [`ExpansionStorage`] fronts the store with a [`RangeMapCache`] and enforces
//! single-writer/multi-reader access through [`AccessLock`] permits.

#![warn(missing_docs)]

pub mod access;
pub mod backend;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod storage;
pub mod store;

pub use access::{AccessLock, ReadAccess, ReadPermit, WriteAccess};
pub use backend::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use cache::{CacheStats, RangeMapCache, DEFAULT_CAPACITY};
pub use error::CacheError;
pub use fingerprint::{ExpansionFile, Fingerprint};
pub use storage::{
    CallSite, ExpansionState, ExpansionStorage, MacroExpansion, RecordInfo, RecordStatus,
};
pub use store::{ExpansionStore, RANGE_MAP_ATTRIBUTE, RANGE_MAP_SCHEMA_VERSION};
