//! Error types for expansion storage operations.

use std::path::PathBuf;

use expanse_source::RangeMapError;

use crate::fingerprint::ExpansionFile;

/// Errors that can occur while storing or loading expansion records.
///
/// Data-integrity errors (`CorruptData`, `SchemaVersionMismatch`) are always
/// recoverable: the plain read paths turn them into a miss so the expansion is
/// recomputed. `WriteDenied` is a caller bug and is always surfaced.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing the blob store.
    #[error("expansion store I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A stored record could not be decoded.
    #[error("corrupt expansion record for {file}: {reason}")]
    CorruptData {
        /// The expansion file the record belongs to.
        file: ExpansionFile,
        /// Description of the decoding failure.
        reason: String,
    },

    /// A stored record was written under a different schema version.
    #[error("schema version mismatch for {file}: expected {expected}, got {actual}")]
    SchemaVersionMismatch {
        /// The expansion file the record belongs to.
        file: ExpansionFile,
        /// The schema version this build reads and writes.
        expected: u16,
        /// The schema version found in the record.
        actual: u16,
    },

    /// A write was attempted without exclusive access to this storage.
    #[error("write to {file} denied: caller does not hold exclusive access")]
    WriteDenied {
        /// The expansion file the write targeted.
        file: ExpansionFile,
    },

    /// A call-site state change was attempted without exclusive access.
    #[error("state change for call site {call_site} denied: caller does not hold exclusive access")]
    StateChangeDenied {
        /// The call site whose state was to change.
        call_site: String,
    },

    /// A mapped target range reaches past the end of the expansion text.
    #[error("mapped range {start}..{end} lies outside the {len}-byte expansion of {call_site}")]
    RangeOutsideExpansion {
        /// The call site being recorded.
        call_site: String,
        /// Start of the offending target range.
        start: u32,
        /// End of the offending target range.
        end: u32,
        /// Length of the expansion text.
        len: usize,
    },

    /// A name that cannot be used as an expansion file name.
    #[error("invalid expansion file name {name:?}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
    },

    /// The ranges supplied for an expansion do not form a valid range map.
    #[error("invalid expansion ranges: {0}")]
    InvalidExpansion(#[from] RangeMapError),
}

impl CacheError {
    /// Returns `true` for errors that only mean "recompute the expansion".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheError::CorruptData { .. } | CacheError::SchemaVersionMismatch { .. }
        )
    }
}
