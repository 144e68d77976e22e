//! Bootstrap argument handling for the shell process.
//!
//! The orchestrator launches each stage process with an argument vector
//! that locates the invocation's working directory. Parsing happens before
//! any store is bound, so failures here are fatal and surface through the
//! process exit code rather than the metadata protocol.

use std::path::{Path, PathBuf};

use crate::errors::InitializationError;

/// Parsed bootstrap arguments identifying one stage invocation.
#[derive(Debug, Clone)]
pub struct BootstrapArgs {
    working_dir: PathBuf,
}

impl BootstrapArgs {
    /// Parses the process argument vector.
    ///
    /// `argv[0]` is the executable name and is skipped; `argv[1]` is the
    /// invocation's working directory.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError` if the working directory argument is
    /// missing or does not name an existing directory.
    pub fn parse<I, S>(argv: I) -> Result<Self, InitializationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let _executable = argv.next();
        let working_dir = argv
            .next()
            .ok_or(InitializationError::MissingWorkingDir)?;
        Self::for_working_dir(PathBuf::from(working_dir))
    }

    /// Builds bootstrap arguments for a known working directory.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError` if the path does not name an existing
    /// directory.
    pub fn for_working_dir(working_dir: PathBuf) -> Result<Self, InitializationError> {
        if !working_dir.exists() {
            return Err(InitializationError::WorkingDirNotFound {
                path: working_dir.display().to_string(),
            });
        }
        if !working_dir.is_dir() {
            return Err(InitializationError::NotADirectory {
                path: working_dir.display().to_string(),
            });
        }
        Ok(Self { working_dir })
    }

    /// Returns the invocation's working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
