//! Exclusive gate over the state file.
//!
//! Mutual exclusion is bootstrapped from atomic hard-link creation:
//! `link(2)` failing on an existing target is atomic even on NFS, where
//! open with `O_EXCL` is not reliable across implementations. Each process
//! links its own private marker file to the shared `lockfile` name; the OS
//! guarantees at most one process creates the name, so the winner holds
//! exclusive write access to the state file until it unlinks `lockfile`.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use linklock_core::error::{LockError, LockResult};
use tracing::trace;

use crate::paths::LockPaths;

/// Bounded-wait exclusive ownership of the state file.
#[derive(Debug)]
pub(crate) struct Gate {
    spin_interval: Duration,
    timeout: Duration,
}

impl Gate {
    pub(crate) fn new(spin_interval: Duration, timeout: Duration) -> Self {
        Self {
            spin_interval,
            timeout,
        }
    }

    /// Acquires the gate. On success the caller owns the state file until
    /// [`unlock`](Self::unlock) runs or the process dies.
    ///
    /// An abandoned `lockfile` (a peer died while holding the gate) cannot
    /// be reclaimed without racing a still-live holder, so after `timeout`
    /// of spinning this fails with `Timeout` and leaves reclamation to the
    /// operator.
    pub(crate) async fn lock(&self, paths: &LockPaths) -> LockResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Participants may run as different users sharing the lock directory.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o777);
        }
        options
            .open(paths.private())
            .map_err(|e| LockError::io(paths.private(), e))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match std::fs::hard_link(paths.private(), paths.lockfile()) {
                Ok(()) => {
                    trace!(lockfile = %paths.lockfile().display(), "gate won");
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tokio::time::sleep(self.spin_interval).await;
                    if Instant::now() > deadline {
                        return Err(LockError::Timeout(self.timeout));
                    }
                }
                Err(e) => return Err(LockError::io(paths.lockfile(), e)),
            }
        }
    }

    /// Releases the gate: removes `lockfile`, then the private marker.
    ///
    /// Both removals are attempted even if the first fails. Removing
    /// `lockfile` first means a crash in between leaves the gate free and
    /// only a stray marker behind, which the same process overwrites on its
    /// next attempt.
    pub(crate) fn unlock(&self, paths: &LockPaths) -> LockResult<()> {
        let gate = std::fs::remove_file(paths.lockfile())
            .map_err(|e| LockError::io(paths.lockfile(), e));
        let marker = std::fs::remove_file(paths.private())
            .map_err(|e| LockError::io(paths.private(), e));
        trace!(lockfile = %paths.lockfile().display(), "gate released");
        gate.and(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ProcessIdentity;
    use tempfile::TempDir;

    fn paths_for(dir: &std::path::Path, host: &str, pid: &str) -> LockPaths {
        LockPaths::new(dir, &ProcessIdentity::new(host, pid).unwrap())
    }

    fn gate() -> Gate {
        Gate::new(Duration::from_micros(1000), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn winner_excludes_the_loser_until_unlock() {
        let dir = TempDir::new().unwrap();
        let first = paths_for(dir.path(), "H1", "1");
        let second = paths_for(dir.path(), "H2", "2");

        gate().lock(&first).await.unwrap();
        assert!(first.lockfile().exists());

        let err = gate().lock(&second).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));

        gate().unlock(&first).unwrap();
        assert!(!first.lockfile().exists());
        assert!(!first.private().exists());

        gate().lock(&second).await.unwrap();
        gate().unlock(&second).unwrap();
    }

    #[tokio::test]
    async fn abandoned_lockfile_times_out() {
        let dir = TempDir::new().unwrap();
        let paths = paths_for(dir.path(), "H1", "1");
        std::fs::write(paths.lockfile(), b"").unwrap();

        let started = Instant::now();
        let err = gate().lock(&paths).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn missing_lockdir_fails_immediately() {
        let dir = TempDir::new().unwrap();
        let paths = paths_for(&dir.path().join("nonexistent"), "H1", "1");

        let err = gate().lock(&paths).await.unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
    }
}
