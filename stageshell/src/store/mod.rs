//! Metadata store abstraction for one stage invocation.
//!
//! The store holds the named, durable entries the orchestrator and this
//! process use to exchange state: args in, outs and markers out. All access
//! from lifecycle code goes through [`MetadataStore`] so the production
//! filesystem layout and the test fakes are interchangeable.

mod files;

pub use files::{FileStore, StoreOptions};

use crate::errors::StoreError;
use std::fmt;

/// A named metadata entry recognized by the invocation protocol.
///
/// The reserved names are fixed by the protocol; orchestrators may define
/// extension entries for their own bookkeeping. Extension names become file
/// names and must not contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    /// Serialized input record, produced by the orchestrator.
    Args,
    /// Serialized output record, produced by this process.
    Outs,
    /// End-of-execution log trailer.
    Log,
    /// Success terminal marker; presence is the signal.
    Complete,
    /// Serialized failure report; presence is the failure marker.
    Errors,
    /// An orchestrator-defined extension entry.
    Extension(String),
}

impl MetadataKey {
    /// Creates an extension key.
    #[must_use]
    pub fn extension(name: impl Into<String>) -> Self {
        Self::Extension(name.into())
    }

    /// Returns the protocol name of this entry.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Args => "args",
            Self::Outs => "outs",
            Self::Log => "log",
            Self::Complete => "complete",
            Self::Errors => "errors",
            Self::Extension(name) => name,
        }
    }

    /// Returns the on-disk file name for this entry.
    ///
    /// Entries are underscore-prefixed inside the working directory, e.g.
    /// `_args`, `_outs`, `_complete`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("_{}", self.as_str())
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable read/write access to named metadata entries.
///
/// `write` must be durable before returning, so that a process crash
/// immediately after a marker write still leaves a correctly-ordered trail
/// for the orchestrator. Implementations never retry; retry policy belongs
/// to the orchestrator.
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Reads the contents of a named entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the entry does not exist, or
    /// `StoreError::Io` on an I/O fault.
    fn read(&self, key: &MetadataKey) -> Result<String, StoreError>;

    /// Durably writes the contents of a named entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` on an I/O fault.
    fn write(&self, key: &MetadataKey, contents: &str) -> Result<(), StoreError>;

    /// Checks whether a named entry exists.
    fn exists(&self, key: &MetadataKey) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_key_names() {
        assert_eq!(MetadataKey::Args.as_str(), "args");
        assert_eq!(MetadataKey::Outs.as_str(), "outs");
        assert_eq!(MetadataKey::Log.as_str(), "log");
        assert_eq!(MetadataKey::Complete.as_str(), "complete");
        assert_eq!(MetadataKey::Errors.as_str(), "errors");
    }

    #[test]
    fn test_file_names_are_underscore_prefixed() {
        assert_eq!(MetadataKey::Args.file_name(), "_args");
        assert_eq!(MetadataKey::extension("perf").file_name(), "_perf");
    }

    #[test]
    fn test_extension_key_display() {
        let key = MetadataKey::extension("jobinfo");
        assert_eq!(key.to_string(), "jobinfo");
    }
}
