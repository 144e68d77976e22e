//! File-backed metadata store.
//!
//! Entries live as underscore-prefixed files inside the invocation's
//! working directory. Writes land under a temporary name, are synced, then
//! renamed into place: an entry is observable under its final name only
//! once its contents are durable.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use super::{MetadataKey, MetadataStore};
use crate::errors::StoreError;

/// Options controlling file store write behavior.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Whether writes fsync before renaming into place. Tests that churn
    /// through many invocations can turn this off.
    pub durable: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { durable: true }
    }
}

/// A metadata store over one stage working directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    options: StoreOptions,
}

impl FileStore {
    /// Creates a file store rooted at a working directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, StoreOptions::default())
    }

    /// Creates a file store with explicit options.
    #[must_use]
    pub fn with_options(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Returns the working directory this store is bound to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &MetadataKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    fn io_fault(key: &MetadataKey, source: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl MetadataStore for FileStore {
    fn read(&self, key: &MetadataKey) -> Result<String, StoreError> {
        let path = self.entry_path(key);
        fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                Self::io_fault(key, err)
            }
        })
    }

    fn write(&self, key: &MetadataKey, contents: &str) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let partial = self.root.join(format!("{}.partial", key.file_name()));

        let mut file = File::create(&partial).map_err(|err| Self::io_fault(key, err))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| Self::io_fault(key, err))?;
        if self.options.durable {
            file.sync_all().map_err(|err| Self::io_fault(key, err))?;
        }
        drop(file);

        fs::rename(&partial, &path).map_err(|err| Self::io_fault(key, err))?;
        tracing::debug!(key = %key, bytes = contents.len(), "metadata entry written");
        Ok(())
    }

    fn exists(&self, key: &MetadataKey) -> bool {
        self.entry_path(key).exists()
    }
}
