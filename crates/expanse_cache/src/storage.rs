//! Coordinator over the expansion store and the range map cache.
//!
//! [`ExpansionStorage`] owns the [`AccessLock`] that callers take permits
//! from, composes cache lookups with store reads, writes through to the cache
//! on every store write, and tracks each macro call site through the
//! `Unexpanded -> Expanding -> Expanded -> Stale` lifecycle. Staleness is
//! detected lazily, by comparing a freshly computed fingerprint against the
//! one encoded in the call site's expansion file name.

use std::fmt;
use std::sync::Arc;

use expanse_common::ContentHash;
use expanse_source::{MappedRange, RangeMap};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::access::{AccessLock, ReadAccess, ReadPermit, WriteAccess};
use crate::backend::BlobStore;
use crate::cache::{CacheStats, RangeMapCache};
use crate::error::CacheError;
use crate::fingerprint::{ExpansionFile, Fingerprint};
use crate::store::ExpansionStore;

/// Opaque identity of a macro invocation site (for example a file path plus
/// the invocation's offset), as chosen by the host.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallSite(String);

impl CallSite {
    /// Creates a call-site key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One finished macro expansion, as supplied by the expansion engine.
#[derive(Clone, Debug)]
pub struct MacroExpansion {
    /// Hash of the macro call (its text and identity).
    pub call_hash: ContentHash,
    /// Hash of the macro definition the call resolved to.
    pub definition_hash: ContentHash,
    /// The synthesized expansion text.
    pub expanded_text: String,
    /// Mapping pairs from expansion text to invocation text.
    pub ranges: Vec<MappedRange>,
}

impl MacroExpansion {
    /// Identity of this expansion.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::mix(self.call_hash, self.definition_hash)
    }
}

/// Where a call site stands in its expansion lifecycle.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExpansionState {
    /// Never expanded in this session.
    Unexpanded,
    /// An expansion is in progress.
    Expanding,
    /// The stored expansion matches the current call and definition.
    Expanded(ExpansionFile),
    /// The stored expansion was produced from a different call or definition.
    Stale(ExpansionFile),
}

#[derive(Clone)]
enum CallSiteEntry {
    /// Expansion in progress; `previous` is restored if it is aborted.
    Expanding { previous: Option<ExpansionFile> },
    Expanded(ExpansionFile),
}

/// Health of one stored record, as reported by [`ExpansionStorage::records`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    /// Decodes under the current schema.
    Valid {
        /// Number of mapping pairs.
        pairs: usize,
    },
    /// Written under another schema version.
    Outdated {
        /// The version found in the record.
        version: u16,
    },
    /// Cannot be decoded.
    Corrupt {
        /// Why decoding failed.
        reason: String,
    },
}

/// Summary of one stored record.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct RecordInfo {
    /// The expansion file.
    pub file: ExpansionFile,
    /// Fingerprint decoded from the file name, if it is one of ours.
    pub fingerprint: Option<Fingerprint>,
    /// Record health.
    #[serde(flatten)]
    pub status: RecordStatus,
}

/// Process-wide coordinator for persisted macro expansions.
///
/// Reads take a shared permit from [`ExpansionStorage::read`] and may run on
/// any number of threads; writes take the exclusive permit from
/// [`ExpansionStorage::write`]. Range maps are handed out as `Arc`s and are
/// immutable, so they can be shared freely.
pub struct ExpansionStorage<B> {
    lock: AccessLock,
    store: ExpansionStore<B>,
    cache: RangeMapCache,
    call_sites: RwLock<FxHashMap<CallSite, CallSiteEntry>>,
}

impl<B: BlobStore> ExpansionStorage<B> {
    /// Creates a coordinator over `backend` holding at most `cache_capacity`
    /// decoded range maps strongly.
    pub fn new(backend: B, cache_capacity: usize) -> Self {
        let lock = AccessLock::new();
        let store = ExpansionStore::new(backend, lock.id());
        Self {
            lock,
            store,
            cache: RangeMapCache::new(cache_capacity),
            call_sites: RwLock::new(FxHashMap::default()),
        }
    }

    /// Takes a shared permit.
    pub fn read(&self) -> ReadAccess<'_> {
        self.lock.read()
    }

    /// Takes the exclusive permit.
    pub fn write(&self) -> WriteAccess<'_> {
        self.lock.write()
    }

    /// The persistent store.
    pub fn store(&self) -> &ExpansionStore<B> {
        &self.store
    }

    /// Cache hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the range map for `file`, from the cache or else the store.
    ///
    /// `None` means the expansion must be recomputed: nothing is stored, or
    /// the stored record is outdated or unreadable.
    pub fn get_range_map(
        &self,
        access: &impl ReadPermit,
        file: &ExpansionFile,
    ) -> Option<Arc<RangeMap>> {
        self.cache
            .get_or_load(file, || self.store.read(access, file))
    }

    /// Persists `map` for `file` and makes it the cached entry, so the next
    /// `get_range_map` is served without touching the store.
    pub fn put_range_map(
        &self,
        access: &WriteAccess<'_>,
        file: &ExpansionFile,
        map: RangeMap,
    ) -> Result<Arc<RangeMap>, CacheError> {
        self.store.write(access, file, &map)?;
        Ok(self.cache.insert(file.clone(), Arc::new(map)))
    }

    /// Drops the cached entry for `file`, e.g. after an external change.
    pub fn invalidate(&self, file: &ExpansionFile) {
        self.cache.invalidate(file);
    }

    /// Drops every cached entry; later reads go back to the store.
    pub fn invalidate_all(&self) {
        self.cache.clear();
        tracing::debug!("invalidated all cached range maps");
    }

    /// Releases strongly cached maps under memory pressure.
    pub fn relieve_pressure(&self) {
        self.cache.relieve_pressure();
    }

    /// Classifies `call_site` given the fingerprint computed from its current
    /// call and definition.
    pub fn expansion_state(
        &self,
        _access: &impl ReadPermit,
        call_site: &CallSite,
        current: Fingerprint,
    ) -> ExpansionState {
        match self.call_sites.read().get(call_site) {
            None => ExpansionState::Unexpanded,
            Some(CallSiteEntry::Expanding { .. }) => ExpansionState::Expanding,
            Some(CallSiteEntry::Expanded(file)) => {
                if file.fingerprint() == Some(current) {
                    ExpansionState::Expanded(file.clone())
                } else {
                    ExpansionState::Stale(file.clone())
                }
            }
        }
    }

    /// Marks `call_site` as being expanded.
    ///
    /// Must be followed by [`ExpansionStorage::record_expansion`] or, if the
    /// expansion engine fails, [`ExpansionStorage::abort_expansion`].
    pub fn begin_expansion(
        &self,
        access: &WriteAccess<'_>,
        call_site: &CallSite,
    ) -> Result<(), CacheError> {
        self.check_write(access, call_site)?;
        let mut call_sites = self.call_sites.write();
        let previous = match call_sites.remove(call_site) {
            Some(CallSiteEntry::Expanded(file)) => Some(file),
            Some(CallSiteEntry::Expanding { previous }) => previous,
            None => None,
        };
        call_sites.insert(call_site.clone(), CallSiteEntry::Expanding { previous });
        Ok(())
    }

    /// Ends an expansion that produced nothing, putting `call_site` back in
    /// the state it had before [`ExpansionStorage::begin_expansion`]. Does
    /// nothing if no expansion is in progress.
    pub fn abort_expansion(
        &self,
        access: &WriteAccess<'_>,
        call_site: &CallSite,
    ) -> Result<(), CacheError> {
        self.check_write(access, call_site)?;
        let mut call_sites = self.call_sites.write();
        if let Some(CallSiteEntry::Expanding { previous }) = call_sites.get(call_site).cloned() {
            match previous {
                Some(file) => {
                    call_sites.insert(call_site.clone(), CallSiteEntry::Expanded(file));
                }
                None => {
                    call_sites.remove(call_site);
                }
            }
            tracing::debug!(%call_site, "expansion aborted");
        }
        Ok(())
    }

    /// Stores a finished expansion for `call_site` and returns the file it is
    /// stored under.
    ///
    /// Every mapped target range must lie inside the expanded text. The file
    /// name is derived from the expansion's fingerprint, so identical call and
    /// definition pairs share one record. The call site's previous file, if
    /// different, is evicted from the cache but left in the store until
    /// [`ExpansionStorage::gc`].
    pub fn record_expansion(
        &self,
        access: &WriteAccess<'_>,
        call_site: &CallSite,
        expansion: &MacroExpansion,
    ) -> Result<ExpansionFile, CacheError> {
        self.check_write(access, call_site)?;
        let len = expansion.expanded_text.len();
        if let Some(outside) = expansion
            .ranges
            .iter()
            .find(|p| p.target.end as usize > len)
        {
            return Err(CacheError::RangeOutsideExpansion {
                call_site: call_site.to_string(),
                start: outside.target.start,
                end: outside.target.end,
                len,
            });
        }

        let map = RangeMap::new(expansion.ranges.clone())?;
        let file = ExpansionFile::for_fingerprint(expansion.fingerprint());
        self.put_range_map(access, &file, map)?;

        let previous = self
            .call_sites
            .write()
            .insert(call_site.clone(), CallSiteEntry::Expanded(file.clone()));
        let old = match previous {
            Some(CallSiteEntry::Expanded(old)) => Some(old),
            Some(CallSiteEntry::Expanding { previous }) => previous,
            None => None,
        };
        if let Some(old) = old {
            if old != file {
                self.cache.invalidate(&old);
                tracing::debug!(%call_site, %old, new = %file, "call site re-expanded");
            }
        }
        Ok(file)
    }

    /// Returns the range map for `call_site` if its stored expansion matches
    /// `current`; `None` means the call site must be (re-)expanded.
    pub fn range_map_for_call(
        &self,
        access: &impl ReadPermit,
        call_site: &CallSite,
        current: Fingerprint,
    ) -> Option<Arc<RangeMap>> {
        match self.expansion_state(access, call_site, current) {
            ExpansionState::Stale(file) => {
                tracing::debug!(%call_site, %file, "stored expansion is stale");
                None
            }
            ExpansionState::Expanding => None,
            ExpansionState::Unexpanded | ExpansionState::Expanded(_) => {
                self.get_range_map(access, &ExpansionFile::for_fingerprint(current))
            }
        }
    }

    /// Lists every stored record with its health.
    pub fn records(&self, access: &impl ReadPermit) -> Result<Vec<RecordInfo>, CacheError> {
        let files = self.store.files(access)?;
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let status = match self.store.try_read(access, &file) {
                Ok(Some(map)) => RecordStatus::Valid { pairs: map.len() },
                // Removed between listing and reading.
                Ok(None) => continue,
                Err(CacheError::SchemaVersionMismatch { actual, .. }) => {
                    RecordStatus::Outdated { version: actual }
                }
                Err(err @ CacheError::CorruptData { .. }) => RecordStatus::Corrupt {
                    reason: err.to_string(),
                },
                Err(err) => return Err(err),
            };
            records.push(RecordInfo {
                fingerprint: file.fingerprint(),
                file,
                status,
            });
        }
        Ok(records)
    }

    /// Removes records whose fingerprint is not in `live`. Files not named by
    /// a fingerprint are left alone. Returns the number of records removed.
    pub fn gc(&self, access: &WriteAccess<'_>, live: &[Fingerprint]) -> Result<usize, CacheError> {
        let live: FxHashSet<Fingerprint> = live.iter().copied().collect();
        let mut removed = 0;
        for file in self.store.files(access)? {
            let Some(fingerprint) = file.fingerprint() else {
                continue;
            };
            if !live.contains(&fingerprint) && self.remove_record(access, &file)? {
                removed += 1;
            }
        }
        tracing::debug!(removed, "collected unreferenced expansion records");
        Ok(removed)
    }

    /// Removes every record that is outdated or cannot be decoded. Returns
    /// the number of records removed.
    pub fn purge_invalid(&self, access: &WriteAccess<'_>) -> Result<usize, CacheError> {
        let mut removed = 0;
        for file in self.store.files(access)? {
            match self.store.try_read(access, &file) {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {
                    if self.remove_record(access, &file)? {
                        removed += 1;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }

    fn remove_record(&self, access: &WriteAccess<'_>, file: &ExpansionFile) -> Result<bool, CacheError> {
        self.cache.invalidate(file);
        self.call_sites.write().retain(|_, entry| match entry {
            CallSiteEntry::Expanded(f) => *f != *file,
            CallSiteEntry::Expanding { previous } => {
                if previous.as_ref() == Some(file) {
                    *previous = None;
                }
                true
            }
        });
        self.store.remove(access, file)
    }

    fn check_write(&self, access: &WriteAccess<'_>, call_site: &CallSite) -> Result<(), CacheError> {
        if access.lock_id() == self.lock.id() {
            return Ok(());
        }
        tracing::error!(
            %call_site,
            permit = access.lock_id(),
            owner = self.lock.id(),
            "call site state change attempted without exclusive access"
        );
        Err(CacheError::StateChangeDenied {
            call_site: call_site.to_string(),
        })
    }
}
