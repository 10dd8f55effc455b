//! NFS-safe distributed reader-writer locks.
//!
//! This crate provides an advisory multi-reader / single-writer lock shared
//! by processes on different hosts that communicate only through a common
//! POSIX filesystem, typically NFS. It needs no lock server and no external
//! service: mutual exclusion is bootstrapped from atomic hard-link
//! creation, the one filesystem operation whose failure-on-conflict is
//! atomic on every NFS implementation (open with `O_EXCL` is not).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use linklock_core::prelude::*;
//! use linklock_nfs::NfsReaderWriterLock;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lock = NfsReaderWriterLock::builder()
//!         .lockdir("/mnt/shared/locks/config")
//!         .spin_interval(Duration::from_micros(1000))
//!         .entry_timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     // Any number of processes may read concurrently
//!     let guard = lock.acquire_read(None).await?;
//!     // ... read the protected data ...
//!     guard.release().await?;
//!
//!     // A writer holds the lock alone
//!     let guard = lock.acquire_write(None).await?;
//!     // ... update the protected data ...
//!     guard.release().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # On-disk layout
//!
//! The lock directory contains three kinds of files:
//!
//! - `state` - a text file listing every known lock request, one per line:
//!   host, pid, mode (`R`/`W`), status (`G`/`P`), and the seconds-since-epoch
//!   time of the entry's last write.
//! - `lockfile` - the gate token; while present, some process owns the
//!   state file. It is always a hard link to one process's marker file.
//! - `<host>.<pid>` - one empty marker file per process that has ever
//!   attempted a lock, the source inode for the gate's hard-link race.
//!
//! An idle directory may be hard-reset by deleting everything in it;
//! deleting only files older than the entry timeout is safe at any time.
//!
//! # Crash tolerance and clocks
//!
//! Entries carry the time they were last written; peers discard entries
//! older than the configured entry timeout, so a crashed holder stalls the
//! system for at most that long. This requires the participants' UTC
//! clocks to agree to within small multiples of one second relative to the
//! entry timeout; the crate does not enforce or compensate for skew.
//!
//! A process that dies while holding the gate itself leaves `lockfile`
//! behind; peers then fail acquisitions with a timeout error rather than
//! risk racing a live holder, and an operator reclaims the directory.
//!
//! # Calling rules
//!
//! Lock state is keyed by `(host, pid)` identity, so one process must not
//! run two overlapping acquisitions with the same identity: acquire, then
//! release, from one place at a time. Holding a lock and requesting
//! another, or releasing without holding, fails with
//! [`LockError::AlreadyLocked`](linklock_core::LockError::AlreadyLocked).

mod gate;
mod name;
mod paths;
mod policy;

pub mod handle;
pub mod identity;
pub mod lock;
pub mod provider;
pub mod state;

pub use handle::{NfsReadLockHandle, NfsWriteLockHandle};
pub use identity::ProcessIdentity;
pub use lock::{
    NfsReaderWriterLock, NfsReaderWriterLockBuilder, DEFAULT_ENTRY_TIMEOUT, DEFAULT_SPIN_INTERVAL,
};
pub use paths::{GATE_FILE, STATE_FILE};
pub use provider::{NfsLockProvider, NfsLockProviderBuilder};
pub use state::{ClientEntry, LockMode, LockStatus, StateFile};
