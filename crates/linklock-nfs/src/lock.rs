//! The NFS reader-writer lock: public operations and the spin driver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use linklock_core::error::{LockError, LockResult};
use linklock_core::traits::DistributedReaderWriterLock;
use tracing::{debug, instrument};

use crate::gate::Gate;
use crate::handle::{NfsReadLockHandle, NfsWriteLockHandle};
use crate::identity::ProcessIdentity;
use crate::paths::LockPaths;
use crate::policy::RequestOutcome;
use crate::state::{unix_now, LockMode, StateFile};

/// Default sleep between retries; low enough to keep acquisition latency
/// close to one network round trip.
pub const DEFAULT_SPIN_INTERVAL: Duration = Duration::from_micros(1000);

/// Default staleness bound for peer entries and ceiling for gate spinning.
/// High enough that a live peer is never mistaken for a dead one.
pub const DEFAULT_ENTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration and identity shared between a lock and its handles.
#[derive(Debug)]
pub(crate) struct LockShared {
    pub(crate) name: String,
    pub(crate) lockdir: PathBuf,
    pub(crate) identity: ProcessIdentity,
    paths: LockPaths,
    gate: Gate,
    spin_interval: Duration,
    entry_timeout: Duration,
}

impl LockShared {
    /// Runs one mutation of the state file under the exclusive gate:
    /// lock the gate, load, mutate, dump if dirty, unlock. The unlock is
    /// attempted even when the mutation fails, and the first error wins.
    pub(crate) async fn gate_cycle<T>(
        &self,
        mutate: impl FnOnce(&mut StateFile, i64) -> LockResult<T>,
    ) -> LockResult<T> {
        self.gate.lock(&self.paths).await?;
        let result = self.mutate_state(mutate);
        let unlocked = self.gate.unlock(&self.paths);
        match (result, unlocked) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    fn mutate_state<T>(
        &self,
        mutate: impl FnOnce(&mut StateFile, i64) -> LockResult<T>,
    ) -> LockResult<T> {
        let mut state = StateFile::load(self.paths.state(), self.entry_timeout)?;
        let value = mutate(&mut state, unix_now())?;
        if state.is_dirty() {
            state.dump(self.paths.state())?;
        }
        Ok(value)
    }

    /// Removes this process's entry from the state file; the next peer
    /// under the gate sees the lock as released.
    pub(crate) async fn release(&self) -> LockResult<()> {
        self.gate_cycle(|state, _now| state.remove(&self.identity))
            .await?;
        debug!(lock.name = %self.name, identity = %self.identity, "released");
        Ok(())
    }
}

/// A reader-writer lock coordinated through a directory on a shared POSIX
/// filesystem.
///
/// Any number of processes on any number of hosts may hold the lock for
/// reading concurrently; a writer holds it alone. The caller owns the lock
/// directory, which must be readable and writable by every participant.
///
/// A holder's entry in the shared state stays valid for the configured
/// entry timeout; peers discard older entries as crashed. Keep critical
/// sections short relative to that timeout, or re-request periodically to
/// refresh the entry.
#[derive(Debug)]
pub struct NfsReaderWriterLock {
    shared: Arc<LockShared>,
}

impl NfsReaderWriterLock {
    /// Returns a builder for configuring a lock.
    pub fn builder() -> NfsReaderWriterLockBuilder {
        NfsReaderWriterLockBuilder::new()
    }

    /// The directory the lock coordinates through.
    pub fn lockdir(&self) -> &std::path::Path {
        &self.shared.lockdir
    }

    /// The identity this process records in the state file.
    pub fn identity(&self) -> &ProcessIdentity {
        &self.shared.identity
    }

    async fn acquire(&self, mode: LockMode, timeout: Option<Duration>) -> LockResult<()> {
        let shared = &self.shared;
        let started = Instant::now();

        loop {
            let outcome = shared
                .gate_cycle(|state, now| state.request(&shared.identity, mode, now))
                .await?;

            match outcome {
                RequestOutcome::Granted => {
                    debug!(lock.name = %shared.name, identity = %shared.identity, ?mode, "granted");
                    return Ok(());
                }
                RequestOutcome::Pending => {
                    if let Some(limit) = timeout {
                        if started.elapsed() >= limit {
                            // Withdraw the pending entry so it does not
                            // stall peers until it goes stale.
                            shared
                                .gate_cycle(|state, _now| {
                                    state.abandon(&shared.identity);
                                    Ok(())
                                })
                                .await?;
                            return Err(LockError::Timeout(limit));
                        }
                    }
                    tokio::time::sleep(shared.spin_interval).await;
                }
            }
        }
    }

    async fn try_acquire(&self, mode: LockMode) -> LockResult<bool> {
        let shared = &self.shared;
        let outcome = shared
            .gate_cycle(|state, now| state.try_request(&shared.identity, mode, now))
            .await?;
        Ok(outcome == RequestOutcome::Granted)
    }
}

impl DistributedReaderWriterLock for NfsReaderWriterLock {
    type ReadHandle = NfsReadLockHandle;
    type WriteHandle = NfsWriteLockHandle;

    fn name(&self) -> &str {
        &self.shared.name
    }

    #[instrument(skip(self), fields(lock.name = %self.shared.name, lockdir = %self.shared.lockdir.display(), backend = "nfs"))]
    async fn acquire_read(&self, timeout: Option<Duration>) -> LockResult<NfsReadLockHandle> {
        self.acquire(LockMode::Read, timeout).await?;
        Ok(NfsReadLockHandle::new(self.shared.clone()))
    }

    #[instrument(skip(self), fields(lock.name = %self.shared.name, lockdir = %self.shared.lockdir.display(), backend = "nfs"))]
    async fn try_acquire_read(&self) -> LockResult<Option<NfsReadLockHandle>> {
        Ok(self
            .try_acquire(LockMode::Read)
            .await?
            .then(|| NfsReadLockHandle::new(self.shared.clone())))
    }

    #[instrument(skip(self), fields(lock.name = %self.shared.name, lockdir = %self.shared.lockdir.display(), backend = "nfs"))]
    async fn acquire_write(&self, timeout: Option<Duration>) -> LockResult<NfsWriteLockHandle> {
        self.acquire(LockMode::Write, timeout).await?;
        Ok(NfsWriteLockHandle::new(self.shared.clone()))
    }

    #[instrument(skip(self), fields(lock.name = %self.shared.name, lockdir = %self.shared.lockdir.display(), backend = "nfs"))]
    async fn try_acquire_write(&self) -> LockResult<Option<NfsWriteLockHandle>> {
        Ok(self
            .try_acquire(LockMode::Write)
            .await?
            .then(|| NfsWriteLockHandle::new(self.shared.clone())))
    }
}

/// Builder for [`NfsReaderWriterLock`].
pub struct NfsReaderWriterLockBuilder {
    lockdir: Option<PathBuf>,
    name: Option<String>,
    spin_interval: Duration,
    entry_timeout: Duration,
    hostname: Option<String>,
    pid: Option<String>,
}

impl NfsReaderWriterLockBuilder {
    /// Creates a new builder with the default spin interval and entry
    /// timeout.
    pub fn new() -> Self {
        Self {
            lockdir: None,
            name: None,
            spin_interval: DEFAULT_SPIN_INTERVAL,
            entry_timeout: DEFAULT_ENTRY_TIMEOUT,
            hostname: None,
            pid: None,
        }
    }

    /// Sets the lock directory. Required. The directory is created if it
    /// does not exist; it should live on the shared filesystem and be
    /// writable by every participant.
    pub fn lockdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.lockdir = Some(path.into());
        self
    }

    /// Sets the lock's display name. Defaults to the lock directory's
    /// final component.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the sleep between retries, both while racing for the gate and
    /// between request passes. Must be non-zero.
    pub fn spin_interval(mut self, interval: Duration) -> Self {
        self.spin_interval = interval;
        self
    }

    /// Sets the staleness bound: peer entries older than this are treated
    /// as crashed, and gate acquisition gives up after spinning this long.
    /// Whole seconds; must be at least one second.
    pub fn entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout = timeout;
        self
    }

    /// Overrides the host component of this process's identity. Defaults
    /// to the OS hostname. Useful for tests simulating several hosts.
    pub fn hostname(mut self, host: impl Into<String>) -> Self {
        self.hostname = Some(host.into());
        self
    }

    /// Overrides the pid component of this process's identity. Defaults to
    /// the OS process id. Useful for tests simulating several processes.
    pub fn pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }

    /// Builds the lock, creating the lock directory if needed.
    pub fn build(self) -> LockResult<NfsReaderWriterLock> {
        let lockdir = self
            .lockdir
            .ok_or_else(|| LockError::InvalidName("lock directory not specified".to_string()))?;
        if self.spin_interval.is_zero() {
            return Err(LockError::InvalidName(
                "spin interval must be non-zero".to_string(),
            ));
        }
        // The staleness bound and the gate spin ceiling are the same
        // quantity; whole seconds keep every use of it in exact agreement.
        if self.entry_timeout.as_secs() == 0 || self.entry_timeout.subsec_nanos() != 0 {
            return Err(LockError::InvalidName(
                "entry timeout must be a whole number of seconds, at least one".to_string(),
            ));
        }

        let default = ProcessIdentity::from_os();
        let identity = ProcessIdentity::new(
            self.hostname.unwrap_or_else(|| default.host().to_string()),
            self.pid.unwrap_or_else(|| default.pid().to_string()),
        )?;

        std::fs::create_dir_all(&lockdir).map_err(|e| LockError::io(&lockdir, e))?;

        let name = self.name.unwrap_or_else(|| {
            lockdir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| lockdir.display().to_string())
        });
        let paths = LockPaths::new(&lockdir, &identity);
        let gate = Gate::new(self.spin_interval, self.entry_timeout);

        Ok(NfsReaderWriterLock {
            shared: Arc::new(LockShared {
                name,
                lockdir,
                identity,
                paths,
                gate,
                spin_interval: self.spin_interval,
                entry_timeout: self.entry_timeout,
            }),
        })
    }
}

impl Default for NfsReaderWriterLockBuilder {
    fn default() -> Self {
        Self::new()
    }
}
