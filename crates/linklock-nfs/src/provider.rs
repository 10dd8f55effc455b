//! Provider for creating locks by name under a base directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use linklock_core::error::{LockError, LockResult};
use linklock_core::traits::ReaderWriterLockProvider;

use crate::lock::{NfsReaderWriterLock, DEFAULT_ENTRY_TIMEOUT, DEFAULT_SPIN_INTERVAL};
use crate::name::lock_directory;

/// Builder for [`NfsLockProvider`].
pub struct NfsLockProviderBuilder {
    directory: Option<PathBuf>,
    spin_interval: Duration,
    entry_timeout: Duration,
    hostname: Option<String>,
    pid: Option<String>,
}

impl NfsLockProviderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            directory: None,
            spin_interval: DEFAULT_SPIN_INTERVAL,
            entry_timeout: DEFAULT_ENTRY_TIMEOUT,
            hostname: None,
            pid: None,
        }
    }

    /// Sets the base directory for lock directories. Required; created if
    /// it doesn't exist.
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Sets the spin interval used by every created lock.
    pub fn spin_interval(mut self, interval: Duration) -> Self {
        self.spin_interval = interval;
        self
    }

    /// Sets the entry timeout used by every created lock.
    pub fn entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout = timeout;
        self
    }

    /// Overrides the identity host component for every created lock.
    pub fn hostname(mut self, host: impl Into<String>) -> Self {
        self.hostname = Some(host.into());
        self
    }

    /// Overrides the identity pid component for every created lock.
    pub fn pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is specified or if the directory
    /// cannot be created.
    pub fn build(self) -> LockResult<NfsLockProvider> {
        let directory = self
            .directory
            .ok_or_else(|| LockError::InvalidName("directory not specified".to_string()))?;

        std::fs::create_dir_all(&directory).map_err(|e| LockError::io(&directory, e))?;

        Ok(NfsLockProvider {
            directory,
            spin_interval: self.spin_interval,
            entry_timeout: self.entry_timeout,
            hostname: self.hostname,
            pid: self.pid,
        })
    }
}

impl Default for NfsLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for NFS reader-writer locks.
///
/// Each named lock gets its own subdirectory of the base directory, so
/// locks with different names never contend on the same gate.
pub struct NfsLockProvider {
    directory: PathBuf,
    spin_interval: Duration,
    entry_timeout: Duration,
    hostname: Option<String>,
    pid: Option<String>,
}

impl NfsLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> NfsLockProviderBuilder {
        NfsLockProviderBuilder::new()
    }

    /// Creates a provider over the specified base directory with default
    /// timing.
    pub fn new(directory: impl Into<PathBuf>) -> LockResult<Self> {
        Self::builder().directory(directory).build()
    }

    /// Returns the base directory lock directories live under.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl ReaderWriterLockProvider for NfsLockProvider {
    type Lock = NfsReaderWriterLock;

    fn create_reader_writer_lock(&self, name: &str) -> LockResult<NfsReaderWriterLock> {
        let lockdir = lock_directory(&self.directory, name)?;

        let mut builder = NfsReaderWriterLock::builder()
            .lockdir(lockdir)
            .name(name)
            .spin_interval(self.spin_interval)
            .entry_timeout(self.entry_timeout);
        if let Some(host) = &self.hostname {
            builder = builder.hostname(host);
        }
        if let Some(pid) = &self.pid {
            builder = builder.pid(pid);
        }
        builder.build()
    }
}
