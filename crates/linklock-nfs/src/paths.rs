//! Well-known file locations under a lock directory.

use std::path::{Path, PathBuf};

use crate::identity::ProcessIdentity;

/// Name of the serialized state file.
pub const STATE_FILE: &str = "state";

/// Name of the exclusive-gate token file.
pub const GATE_FILE: &str = "lockfile";

/// The three files the protocol keeps under a lock directory.
///
/// Computed once per lock value; configuration and identity are immutable
/// per value, so the paths never need recomputing.
#[derive(Debug, Clone)]
pub(crate) struct LockPaths {
    state: PathBuf,
    lockfile: PathBuf,
    private: PathBuf,
}

impl LockPaths {
    pub(crate) fn new(lockdir: &Path, identity: &ProcessIdentity) -> Self {
        Self {
            state: lockdir.join(STATE_FILE),
            lockfile: lockdir.join(GATE_FILE),
            private: lockdir.join(format!("{}.{}", identity.host(), identity.pid())),
        }
    }

    /// The serialized state file.
    pub(crate) fn state(&self) -> &Path {
        &self.state
    }

    /// The exclusive-gate token.
    pub(crate) fn lockfile(&self) -> &Path {
        &self.lockfile
    }

    /// This process's private marker file, the source inode for the gate's
    /// hard-link race.
    pub(crate) fn private(&self) -> &Path {
        &self.private
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_the_three_well_known_paths() {
        let identity = ProcessIdentity::new("H1", "17").unwrap();
        let paths = LockPaths::new(Path::new("/mnt/locks/config"), &identity);
        assert_eq!(paths.state(), Path::new("/mnt/locks/config/state"));
        assert_eq!(paths.lockfile(), Path::new("/mnt/locks/config/lockfile"));
        assert_eq!(paths.private(), Path::new("/mnt/locks/config/H1.17"));
    }
}
