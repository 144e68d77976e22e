//! In-memory metadata store for tests.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::StoreError;
use crate::store::{MetadataKey, MetadataStore};

/// An in-memory metadata store that records write order and supports fault
/// injection.
///
/// Clones share the same underlying entries, so a test can keep a handle
/// while the context owns its own copy.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<HashMap<String, String>>,
    write_log: Mutex<Vec<String>>,
    fail_reads: RwLock<HashSet<String>>,
    fail_writes: RwLock<HashSet<String>>,
    fail_next_writes: RwLock<HashSet<String>>,
    writes_before_crash: Mutex<Option<usize>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry, bypassing write tracking and fault injection.
    pub fn seed(&self, key: &MetadataKey, contents: &str) {
        self.inner
            .entries
            .write()
            .insert(key.as_str().to_string(), contents.to_string());
    }

    /// Seeds an entry, builder style.
    #[must_use]
    pub fn with_entry(self, key: &MetadataKey, contents: &str) -> Self {
        self.seed(key, contents);
        self
    }

    /// Returns the contents of an entry, if present.
    #[must_use]
    pub fn entry(&self, key: &MetadataKey) -> Option<String> {
        self.inner.entries.read().get(key.as_str()).cloned()
    }

    /// Returns the keys written so far, in write order.
    #[must_use]
    pub fn write_order(&self) -> Vec<String> {
        self.inner.write_log.lock().clone()
    }

    /// Makes every read of a key fail with an injected I/O fault.
    pub fn fail_reads_of(&self, key: &MetadataKey) {
        self.inner
            .fail_reads
            .write()
            .insert(key.as_str().to_string());
    }

    /// Makes every write of a key fail with an injected I/O fault.
    pub fn fail_writes_of(&self, key: &MetadataKey) {
        self.inner
            .fail_writes
            .write()
            .insert(key.as_str().to_string());
    }

    /// Makes only the next write of a key fail, then recover.
    pub fn fail_next_write_of(&self, key: &MetadataKey) {
        self.inner
            .fail_next_writes
            .write()
            .insert(key.as_str().to_string());
    }

    /// Simulates a crash after `n` successful writes: every later write
    /// fails with an injected I/O fault.
    pub fn crash_after_writes(&self, n: usize) {
        *self.inner.writes_before_crash.lock() = Some(n);
    }

    fn injected_fault(key: &MetadataKey, what: &str) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            source: std::io::Error::other(format!("injected {what} fault")),
        }
    }
}

impl MetadataStore for InMemoryStore {
    fn read(&self, key: &MetadataKey) -> Result<String, StoreError> {
        if self.inner.fail_reads.read().contains(key.as_str()) {
            return Err(Self::injected_fault(key, "read"));
        }
        self.inner
            .entries
            .read()
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn write(&self, key: &MetadataKey, contents: &str) -> Result<(), StoreError> {
        if self.inner.fail_next_writes.write().remove(key.as_str()) {
            return Err(Self::injected_fault(key, "write"));
        }
        if self.inner.fail_writes.read().contains(key.as_str()) {
            return Err(Self::injected_fault(key, "write"));
        }
        {
            let mut remaining = self.inner.writes_before_crash.lock();
            match remaining.as_mut() {
                Some(0) => return Err(Self::injected_fault(key, "crash")),
                Some(n) => *n -= 1,
                None => {}
            }
        }

        self.inner
            .entries
            .write()
            .insert(key.as_str().to_string(), contents.to_string());
        self.inner.write_log.lock().push(key.as_str().to_string());
        Ok(())
    }

    fn exists(&self, key: &MetadataKey) -> bool {
        self.inner.entries.read().contains_key(key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let store = InMemoryStore::new();
        store.write(&MetadataKey::Outs, "{}").unwrap();

        assert_eq!(store.read(&MetadataKey::Outs).unwrap(), "{}");
        assert!(store.exists(&MetadataKey::Outs));
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let store = InMemoryStore::new();

        assert!(matches!(
            store.read(&MetadataKey::Args),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_write_order_is_recorded() {
        let store = InMemoryStore::new();
        store.write(&MetadataKey::Outs, "{}").unwrap();
        store.write(&MetadataKey::Log, "end").unwrap();
        store.write(&MetadataKey::Complete, "").unwrap();

        assert_eq!(store.write_order(), vec!["outs", "log", "complete"]);
    }

    #[test]
    fn test_clones_share_entries() {
        let store = InMemoryStore::new();
        let handle = store.clone();
        store.write(&MetadataKey::Log, "end").unwrap();

        assert_eq!(handle.entry(&MetadataKey::Log).as_deref(), Some("end"));
    }

    #[test]
    fn test_injected_read_fault() {
        let store = InMemoryStore::new().with_entry(&MetadataKey::Args, "{}");
        store.fail_reads_of(&MetadataKey::Args);

        assert!(matches!(
            store.read(&MetadataKey::Args),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_fail_next_write_recovers() {
        let store = InMemoryStore::new();
        store.fail_next_write_of(&MetadataKey::Errors);

        assert!(store.write(&MetadataKey::Errors, "first").is_err());
        assert!(store.write(&MetadataKey::Errors, "second").is_ok());
        assert_eq!(store.entry(&MetadataKey::Errors).as_deref(), Some("second"));
    }

    #[test]
    fn test_crash_after_writes() {
        let store = InMemoryStore::new();
        store.crash_after_writes(1);

        assert!(store.write(&MetadataKey::Outs, "{}").is_ok());
        assert!(store.write(&MetadataKey::Log, "end").is_err());
        assert!(store.write(&MetadataKey::Complete, "").is_err());
    }
}
