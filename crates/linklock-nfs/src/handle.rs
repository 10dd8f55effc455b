//! Handles for held NFS locks.

use std::sync::Arc;

use linklock_core::error::LockResult;
use linklock_core::traits::LockHandle;
use tracing::instrument;

use crate::lock::LockShared;

/// Handle for a held read lock.
///
/// `release()` runs the full removal protocol under the exclusive gate and
/// reports its errors. A handle dropped without releasing leaves its entry
/// in the shared state; peers discard it once it goes stale, the same way
/// they would after a crash.
#[derive(Debug)]
#[must_use = "dropping a lock handle without release() leaves the entry to expire"]
pub struct NfsReadLockHandle {
    shared: Arc<LockShared>,
}

impl NfsReadLockHandle {
    pub(crate) fn new(shared: Arc<LockShared>) -> Self {
        Self { shared }
    }
}

impl LockHandle for NfsReadLockHandle {
    #[instrument(skip(self), fields(lock.name = %self.shared.name, identity = %self.shared.identity, backend = "nfs"))]
    async fn release(self) -> LockResult<()> {
        self.shared.release().await
    }
}

/// Handle for a held write lock.
///
/// Same release semantics as [`NfsReadLockHandle`].
#[derive(Debug)]
#[must_use = "dropping a lock handle without release() leaves the entry to expire"]
pub struct NfsWriteLockHandle {
    shared: Arc<LockShared>,
}

impl NfsWriteLockHandle {
    pub(crate) fn new(shared: Arc<LockShared>) -> Self {
        Self { shared }
    }
}

impl LockHandle for NfsWriteLockHandle {
    #[instrument(skip(self), fields(lock.name = %self.shared.name, identity = %self.shared.identity, backend = "nfs"))]
    async fn release(self) -> LockResult<()> {
        self.shared.release().await
    }
}
