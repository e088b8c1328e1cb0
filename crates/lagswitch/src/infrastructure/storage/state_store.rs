//! State file persistence.
//!
//! The state file's existence is the flag: present means the block is active.
//! While present it contains a TOML [`StateRecord`]:
//!
//! ```toml
//! version = 1
//! activated_at = 1760515200
//! activated_by = 812
//! ```
//!
//! Every read-decide-write cycle must hold the [`StateLock`], an exclusive
//! `flock` on `<state file>.lock`, so two toggles started at the same time
//! cannot both observe the same state.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use lagswitch_core::{LagState, StateRecord};
use thiserror::Error;

use super::atomic::write_atomic;

/// Error type for state file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The record could not be serialized.
    #[error("failed to serialize state record: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The lock file could not be locked.
    #[error("failed to lock {path}: {reason}")]
    Lock { path: PathBuf, reason: String },
}

/// Exclusive lock on the state lock file; released on drop.
pub struct StateLock {
    #[cfg(unix)]
    _flock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

/// Reads and writes the state file at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Blocks until the exclusive state lock is held.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the lock file cannot be opened,
    /// [`StoreError::Lock`] if `flock` fails.
    pub fn lock(&self) -> Result<StateLock, StoreError> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            let flock = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
                .map_err(|(_, errno)| StoreError::Lock {
                    path: lock_path,
                    reason: errno.to_string(),
                })?;
            Ok(StateLock { _flock: flock })
        }

        #[cfg(not(unix))]
        {
            Ok(StateLock { _file: file })
        }
    }

    /// Returns the current state: active iff the state file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for errors other than "not found".
    pub fn load(&self) -> Result<LagState, StoreError> {
        match fs::symlink_metadata(&self.path) {
            Ok(_) => Ok(LagState::Active),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LagState::Inactive),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Reads the record stored in the state file.
    ///
    /// Returns `Ok(None)` when the file is absent, and also when it is present
    /// but unreadable as a record (the state is still active in that case).
    pub fn record(&self) -> Result<Option<StateRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        match toml::from_str::<StateRecord>(&content) {
            Ok(record) if record.is_supported() => Ok(Some(record)),
            Ok(record) => {
                tracing::warn!(version = record.version, "state record has unsupported version");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "state file is not a valid record: {e}");
                Ok(None)
            }
        }
    }

    /// Marks the block active by atomically writing a fresh record.
    pub fn activate(&self, activated_by: u32) -> Result<StateRecord, StoreError> {
        let record = StateRecord::new(unix_now(), activated_by);
        let content = toml::to_string(&record)?;
        write_atomic(&self.path, content.as_bytes()).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(record)
    }

    /// Marks the block inactive by removing the state file.  Removing an
    /// already-absent file is not an error.
    pub fn deactivate(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Current Unix time in seconds; zero if the clock is before 1970.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
