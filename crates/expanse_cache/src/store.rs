//! Versioned, durable storage of range maps per expansion file.
//!
//! A record is the schema version followed by the range map payload:
//!
//! ```text
//! record := schema_version:u16 (little-endian) | payload
//! ```
//!
//! Bumping [`RANGE_MAP_SCHEMA_VERSION`] invalidates every stored record: an
//! old record reads as absent and the expansion is recomputed.

use expanse_source::RangeMap;

use crate::access::{ReadPermit, WriteAccess};
use crate::backend::BlobStore;
use crate::error::CacheError;
use crate::fingerprint::ExpansionFile;

/// Attribute namespace range map records are stored under.
pub const RANGE_MAP_ATTRIBUTE: &str = "expanse.macro.range_map";

/// Current record schema version. Increment on any change to the record or
/// payload layout.
pub const RANGE_MAP_SCHEMA_VERSION: u16 = 2;

/// Size of the schema version prefix.
const VERSION_LEN: usize = 2;

/// Encodes a range map as a full record under the current schema version.
pub fn encode_record(map: &RangeMap) -> Result<Vec<u8>, CacheError> {
    let payload = map.serialize()?;
    let mut record = Vec::with_capacity(VERSION_LEN + payload.len());
    record.extend_from_slice(&RANGE_MAP_SCHEMA_VERSION.to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Decodes a record, checking the schema version before the payload.
pub fn decode_record(file: &ExpansionFile, record: &[u8]) -> Result<RangeMap, CacheError> {
    let Some((version, payload)) = record.split_first_chunk::<VERSION_LEN>() else {
        return Err(CacheError::CorruptData {
            file: file.clone(),
            reason: format!("record is {} bytes, shorter than its header", record.len()),
        });
    };

    let version = u16::from_le_bytes(*version);
    if version != RANGE_MAP_SCHEMA_VERSION {
        return Err(CacheError::SchemaVersionMismatch {
            file: file.clone(),
            expected: RANGE_MAP_SCHEMA_VERSION,
            actual: version,
        });
    }

    RangeMap::deserialize(payload).map_err(|e| CacheError::CorruptData {
        file: file.clone(),
        reason: e.to_string(),
    })
}

/// Durable association of expansion files with their range maps.
///
/// Writes require a [`WriteAccess`] taken from the lock this store belongs to;
/// reads require any [`ReadPermit`].
pub struct ExpansionStore<B> {
    backend: B,
    /// Id of the [`AccessLock`](crate::access::AccessLock) guarding this store.
    owner: u64,
}

impl<B: BlobStore> ExpansionStore<B> {
    /// Creates a store over `backend`, guarded by the lock with id `owner`.
    pub fn new(backend: B, owner: u64) -> Self {
        Self { backend, owner }
    }

    /// The underlying blob store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check_write(&self, access: &WriteAccess<'_>, file: &ExpansionFile) -> Result<(), CacheError> {
        if access.lock_id() != self.owner {
            tracing::error!(
                %file,
                permit = access.lock_id(),
                owner = self.owner,
                "expansion store write attempted without exclusive access"
            );
            return Err(CacheError::WriteDenied { file: file.clone() });
        }
        Ok(())
    }

    fn check_read(&self, access: &impl ReadPermit) {
        debug_assert_eq!(
            access.lock_id(),
            self.owner,
            "read permit taken from a different expansion storage"
        );
    }

    /// Serializes `map` and durably associates it with `file`.
    pub fn write(
        &self,
        access: &WriteAccess<'_>,
        file: &ExpansionFile,
        map: &RangeMap,
    ) -> Result<(), CacheError> {
        self.check_write(access, file)?;
        let record = encode_record(map)?;
        self.backend.write(RANGE_MAP_ATTRIBUTE, file, &record)?;
        tracing::debug!(%file, pairs = map.len(), bytes = record.len(), "stored range map");
        Ok(())
    }

    /// Loads the range map for `file`, reporting every failure.
    ///
    /// `Ok(None)` means nothing is stored.
    pub fn try_read(
        &self,
        access: &impl ReadPermit,
        file: &ExpansionFile,
    ) -> Result<Option<RangeMap>, CacheError> {
        self.check_read(access);
        let Some(record) = self.backend.read(RANGE_MAP_ATTRIBUTE, file)? else {
            return Ok(None);
        };
        decode_record(file, &record).map(Some)
    }

    /// Loads the range map for `file`.
    ///
    /// Fail-safe: a missing, outdated or corrupt record, or an I/O failure,
    /// all read as `None` so the caller recomputes the expansion.
    pub fn read(&self, access: &impl ReadPermit, file: &ExpansionFile) -> Option<RangeMap> {
        match self.try_read(access, file) {
            Ok(map) => map,
            Err(err @ CacheError::SchemaVersionMismatch { .. }) => {
                tracing::debug!(%file, error = %err, "ignoring outdated range map record");
                None
            }
            Err(err) => {
                tracing::warn!(%file, error = %err, "ignoring unreadable range map record");
                None
            }
        }
    }

    /// Removes the record for `file`. Returns `true` if one was stored.
    pub fn remove(&self, access: &WriteAccess<'_>, file: &ExpansionFile) -> Result<bool, CacheError> {
        self.check_write(access, file)?;
        self.backend.remove(RANGE_MAP_ATTRIBUTE, file)
    }

    /// Lists every file with a stored record.
    pub fn files(&self, access: &impl ReadPermit) -> Result<Vec<ExpansionFile>, CacheError> {
        self.check_read(access);
        self.backend.files(RANGE_MAP_ATTRIBUTE)
    }
}
