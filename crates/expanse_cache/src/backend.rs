//! Durable key/value blob storage underneath the expansion store.
//!
//! Blobs are addressed by an attribute namespace plus an [`ExpansionFile`],
//! the way a virtual file system attaches named attributes to files. The
//! store above this layer owns record framing and versioning; backends only
//! move bytes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::fingerprint::ExpansionFile;

/// Attribute-style blob storage keyed by `(attribute, file)`.
///
/// Implementations must make `write` atomic with respect to `read`: a reader
/// observes either the old bytes or the new bytes, never a mix.
pub trait BlobStore: Send + Sync {
    /// Reads the blob, returning `None` if none is stored.
    fn read(&self, attribute: &str, file: &ExpansionFile) -> Result<Option<Vec<u8>>, CacheError>;

    /// Replaces the blob.
    fn write(&self, attribute: &str, file: &ExpansionFile, bytes: &[u8]) -> Result<(), CacheError>;

    /// Removes the blob. Returns `true` if one was stored.
    fn remove(&self, attribute: &str, file: &ExpansionFile) -> Result<bool, CacheError>;

    /// Lists every file with a blob under the attribute, sorted by name.
    fn files(&self, attribute: &str) -> Result<Vec<ExpansionFile>, CacheError>;
}

/// Prefix of in-flight temporary files; never listed as blobs, and reserved
/// so no [`ExpansionFile`] can carry it.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Blob store on the local filesystem.
///
/// Each blob is stored at `<root>/<attribute>/<file>`. Writes go to a
/// temporary sibling that is then renamed over the target.
pub struct FsBlobStore {
    /// Root directory of the store.
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at the given directory. The directory is
    /// created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path a blob is stored at.
    pub fn blob_path(&self, attribute: &str, file: &ExpansionFile) -> PathBuf {
        self.root.join(attribute).join(file.name())
    }

    fn ensure_dir(&self, attribute: &str) -> Result<PathBuf, CacheError> {
        let dir = self.root.join(attribute);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(dir)
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, attribute: &str, file: &ExpansionFile) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.blob_path(attribute, file);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    fn write(&self, attribute: &str, file: &ExpansionFile, bytes: &[u8]) -> Result<(), CacheError> {
        let dir = self.ensure_dir(attribute)?;
        let path = dir.join(file.name());
        let temp = dir.join(format!(
            "{TEMP_PREFIX}{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        std::fs::write(&temp, bytes).map_err(|e| CacheError::Io {
            path: temp.clone(),
            source: e,
        })?;
        std::fs::rename(&temp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            CacheError::Io { path, source: e }
        })
    }

    fn remove(&self, attribute: &str, file: &ExpansionFile) -> Result<bool, CacheError> {
        let path = self.blob_path(attribute, file);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    fn files(&self, attribute: &str) -> Result<Vec<ExpansionFile>, CacheError> {
        let dir = self.root.join(attribute);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io {
                path: dir.clone(),
                source: e,
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            if let Ok(file) = ExpansionFile::new(name) {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// In-memory blob store.
///
/// Used for tests and for hosts that persist elsewhere. Counts backend reads
/// so callers can verify that cache hits never reach the store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<FxHashMap<(String, ExpansionFile), Arc<[u8]>>>,
    reads: AtomicUsize,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, attribute: &str, file: &ExpansionFile) -> Result<Option<Vec<u8>>, CacheError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let blobs = self.blobs.read();
        Ok(blobs
            .get(&(attribute.to_string(), file.clone()))
            .map(|bytes| bytes.to_vec()))
    }

    fn write(&self, attribute: &str, file: &ExpansionFile, bytes: &[u8]) -> Result<(), CacheError> {
        self.blobs
            .write()
            .insert((attribute.to_string(), file.clone()), Arc::from(bytes));
        Ok(())
    }

    fn remove(&self, attribute: &str, file: &ExpansionFile) -> Result<bool, CacheError> {
        Ok(self
            .blobs
            .write()
            .remove(&(attribute.to_string(), file.clone()))
            .is_some())
    }

    fn files(&self, attribute: &str) -> Result<Vec<ExpansionFile>, CacheError> {
        let mut files: Vec<ExpansionFile> = self
            .blobs
            .read()
            .keys()
            .filter(|(attr, _)| attr == attribute)
            .map(|(_, file)| file.clone())
            .collect();
        files.sort();
        Ok(files)
    }
}

impl<B: BlobStore + ?Sized> BlobStore for Arc<B> {
    fn read(&self, attribute: &str, file: &ExpansionFile) -> Result<Option<Vec<u8>>, CacheError> {
        (**self).read(attribute, file)
    }

    fn write(&self, attribute: &str, file: &ExpansionFile, bytes: &[u8]) -> Result<(), CacheError> {
        (**self).write(attribute, file, bytes)
    }

    fn remove(&self, attribute: &str, file: &ExpansionFile) -> Result<bool, CacheError> {
        (**self).remove(attribute, file)
    }

    fn files(&self, attribute: &str) -> Result<Vec<ExpansionFile>, CacheError> {
        (**self).files(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTR: &str = "range_map";

    fn file(name: &str) -> ExpansionFile {
        ExpansionFile::new(name).unwrap()
    }

    fn make_fs_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn fs_write_and_read_roundtrip() {
        let (_dir, store) = make_fs_store();
        store.write(ATTR, &file("a.rs"), b"hello").unwrap();
        assert_eq!(store.read(ATTR, &file("a.rs")).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn fs_read_missing_returns_none() {
        let (_dir, store) = make_fs_store();
        assert_eq!(store.read(ATTR, &file("missing.rs")).unwrap(), None);
    }

    #[test]
    fn fs_overwrite_replaces_bytes() {
        let (_dir, store) = make_fs_store();
        store.write(ATTR, &file("a.rs"), b"old bytes, longer").unwrap();
        store.write(ATTR, &file("a.rs"), b"new").unwrap();
        assert_eq!(store.read(ATTR, &file("a.rs")).unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn fs_blob_path_format() {
        let (_dir, store) = make_fs_store();
        let path = store.blob_path(ATTR, &file("abc_expansion.rs"));
        assert!(path.ends_with("range_map/abc_expansion.rs"));
    }

    #[test]
    fn fs_files_skips_temporaries_and_dirs() {
        let (dir, store) = make_fs_store();
        store.write(ATTR, &file("b.rs"), b"b").unwrap();
        store.write(ATTR, &file("a.rs"), b"a").unwrap();
        std::fs::write(dir.path().join(ATTR).join(".tmp-1-1"), b"partial").unwrap();
        std::fs::create_dir(dir.path().join(ATTR).join("nested")).unwrap();

        let files = store.files(ATTR).unwrap();
        assert_eq!(files, vec![file("a.rs"), file("b.rs")]);
    }

    #[test]
    fn fs_files_of_missing_attribute_is_empty() {
        let (_dir, store) = make_fs_store();
        assert!(store.files("nothing").unwrap().is_empty());
    }

    #[test]
    fn fs_remove() {
        let (_dir, store) = make_fs_store();
        store.write(ATTR, &file("a.rs"), b"a").unwrap();
        assert!(store.remove(ATTR, &file("a.rs")).unwrap());
        assert!(!store.remove(ATTR, &file("a.rs")).unwrap());
        assert_eq!(store.read(ATTR, &file("a.rs")).unwrap(), None);
    }

    #[test]
    fn fs_attributes_are_separate_namespaces() {
        let (_dir, store) = make_fs_store();
        store.write("one", &file("a.rs"), b"1").unwrap();
        store.write("two", &file("a.rs"), b"2").unwrap();
        assert_eq!(store.read("one", &file("a.rs")).unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.read("two", &file("a.rs")).unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn memory_store_counts_reads() {
        let store = MemoryBlobStore::new();
        store.write(ATTR, &file("a.rs"), b"a").unwrap();
        assert_eq!(store.read_count(), 0);
        assert!(store.read(ATTR, &file("a.rs")).unwrap().is_some());
        assert!(store.read(ATTR, &file("b.rs")).unwrap().is_none());
        assert_eq!(store.read_count(), 2);
    }

    #[test]
    fn memory_store_lists_and_removes() {
        let store = MemoryBlobStore::new();
        store.write(ATTR, &file("b.rs"), b"b").unwrap();
        store.write(ATTR, &file("a.rs"), b"a").unwrap();
        store.write("other", &file("c.rs"), b"c").unwrap();
        assert_eq!(store.files(ATTR).unwrap(), vec![file("a.rs"), file("b.rs")]);
        assert!(store.remove(ATTR, &file("a.rs")).unwrap());
        assert_eq!(store.files(ATTR).unwrap(), vec![file("b.rs")]);
    }

    #[test]
    fn shared_backend_through_arc() {
        let store = Arc::new(MemoryBlobStore::new());
        let shared: Arc<MemoryBlobStore> = Arc::clone(&store);
        BlobStore::write(&shared, ATTR, &file("a.rs"), b"a").unwrap();
        assert!(BlobStore::read(&*store, ATTR, &file("a.rs")).unwrap().is_some());
    }
}
