//! Shared/exclusive access permits for expansion storage.
//!
//! Readers (analysis, highlighting, indexing) may run concurrently; a writer
//! (re-running an expansion after an edit) needs exclusive access. Permits are
//! scoped guards, so an exclusive section always ends when the guard drops,
//! including during unwinding.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// A single-writer/multiple-reader lock identifying one storage instance.
pub struct AccessLock {
    id: u64,
    lock: RwLock<()>,
}

impl AccessLock {
    /// Creates a lock with a process-unique identity.
    pub fn new() -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            lock: RwLock::new(()),
        }
    }

    /// Identity of this lock; permits carry it so foreign permits are detected.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until shared access is available.
    pub fn read(&self) -> ReadAccess<'_> {
        ReadAccess {
            lock_id: self.id,
            _guard: self.lock.read(),
        }
    }

    /// Blocks until exclusive access is available.
    pub fn write(&self) -> WriteAccess<'_> {
        WriteAccess {
            lock_id: self.id,
            _guard: self.lock.write(),
        }
    }

    /// Returns shared access if no writer holds the lock.
    pub fn try_read(&self) -> Option<ReadAccess<'_>> {
        self.lock.try_read().map(|guard| ReadAccess {
            lock_id: self.id,
            _guard: guard,
        })
    }

    /// Returns exclusive access if nobody holds the lock.
    pub fn try_write(&self) -> Option<WriteAccess<'_>> {
        self.lock.try_write().map(|guard| WriteAccess {
            lock_id: self.id,
            _guard: guard,
        })
    }
}

impl Default for AccessLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that grants at least shared access.
pub trait ReadPermit {
    /// Identity of the lock the permit was taken from.
    fn lock_id(&self) -> u64;
}

/// Shared access to one storage instance.
pub struct ReadAccess<'a> {
    lock_id: u64,
    _guard: RwLockReadGuard<'a, ()>,
}

/// Exclusive access to one storage instance. Also grants read access.
pub struct WriteAccess<'a> {
    lock_id: u64,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl ReadPermit for ReadAccess<'_> {
    fn lock_id(&self) -> u64 {
        self.lock_id
    }
}

impl ReadPermit for WriteAccess<'_> {
    fn lock_id(&self) -> u64 {
        self.lock_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_have_distinct_ids() {
        let a = AccessLock::new();
        let b = AccessLock::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.read().lock_id(), a.id());
        assert_eq!(b.write().lock_id(), b.id());
    }

    #[test]
    fn readers_share() {
        let lock = AccessLock::new();
        let _first = lock.read();
        assert!(lock.try_read().is_some());
        assert!(lock.try_write().is_none());
    }

    #[test]
    fn writer_excludes_everyone() {
        let lock = AccessLock::new();
        let guard = lock.write();
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());
        drop(guard);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn write_access_released_on_panic() {
        let lock = AccessLock::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.write();
            panic!("expansion failed");
        }));
        assert!(result.is_err());
        assert!(lock.try_write().is_some());
    }
}
