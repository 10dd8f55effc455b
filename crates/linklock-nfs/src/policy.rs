//! Reader-writer admission policy, applied under the exclusive gate.
//!
//! A read request is admissible while nothing is granted or only readers
//! are; a write request is admissible only while nothing is granted at all.
//! A writer that finds readers granted waits as a pending entry and is
//! granted by its own retry once the readers drain.

use linklock_core::error::{LockError, LockResult};
use tracing::debug;

use crate::identity::ProcessIdentity;
use crate::state::{ClientEntry, LockMode, LockStatus, StateFile};

/// Result of one request pass under the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestOutcome {
    /// The caller's entry is granted; the lock is held.
    Granted,
    /// The caller's request waits; retry after the spin interval.
    Pending,
}

impl StateFile {
    fn admissible(&self, mode: LockMode) -> bool {
        match self.granted() {
            None => true,
            Some(g) => mode == LockMode::Read && g.mode == LockMode::Read,
        }
    }

    /// Requests the lock in `mode` for `identity`, creating or upgrading
    /// the caller's entry.
    ///
    /// A caller that already holds a granted lock, or that has an
    /// outstanding request in the other mode, is misusing the lock and
    /// fails with `AlreadyLocked`. An existing pending entry of the same
    /// mode is upgraded in place when admissible, otherwise its time is
    /// refreshed so peers do not discard it as stale.
    pub(crate) fn request(
        &mut self,
        identity: &ProcessIdentity,
        mode: LockMode,
        now: i64,
    ) -> LockResult<RequestOutcome> {
        let admissible = self.admissible(mode);

        match self.position(identity) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.status == LockStatus::Granted || entry.mode != mode {
                    return Err(LockError::AlreadyLocked(format!(
                        "{identity} already has an outstanding {:?} request",
                        entry.mode
                    )));
                }
                if admissible {
                    entry.status = LockStatus::Granted;
                    self.dirty = true;
                    debug!(%identity, ?mode, "pending request granted");
                } else if entry.time != now {
                    entry.time = now;
                    self.dirty = true;
                }
            }
            None => {
                self.entries.push(ClientEntry {
                    host: identity.host().to_string(),
                    pid: identity.pid().to_string(),
                    mode,
                    status: if admissible {
                        LockStatus::Granted
                    } else {
                        LockStatus::Pending
                    },
                    time: now,
                });
                self.dirty = true;
                debug!(%identity, ?mode, admissible, "new request recorded");
            }
        }

        Ok(if admissible {
            RequestOutcome::Granted
        } else {
            RequestOutcome::Pending
        })
    }

    /// Like [`request`](Self::request), but never leaves a new pending
    /// entry behind: when the request is not admissible the state is left
    /// as loaded (apart from refreshing an existing pending entry of the
    /// caller's own).
    pub(crate) fn try_request(
        &mut self,
        identity: &ProcessIdentity,
        mode: LockMode,
        now: i64,
    ) -> LockResult<RequestOutcome> {
        let admissible = self.admissible(mode);

        match self.position(identity) {
            Some(_) => self.request(identity, mode, now),
            None if admissible => self.request(identity, mode, now),
            None => Ok(RequestOutcome::Pending),
        }
    }

    /// Removes the caller's entry. Releasing without an outstanding entry
    /// is misuse (or the entry already expired and was discarded by a
    /// peer); either way there is nothing to release.
    pub(crate) fn remove(&mut self, identity: &ProcessIdentity) -> LockResult<()> {
        let Some(index) = self.position(identity) else {
            return Err(LockError::AlreadyLocked(format!(
                "{identity} has no outstanding request to release"
            )));
        };
        self.entries.remove(index);
        self.dirty = true;
        debug!(%identity, "request removed");
        Ok(())
    }

    /// Withdraws the caller's entry if it is still pending. Used when a
    /// caller abandons an acquisition, so the stale pending entry does not
    /// linger until peers discard it.
    pub(crate) fn abandon(&mut self, identity: &ProcessIdentity) {
        if let Some(index) = self.position(identity) {
            if self.entries[index].status == LockStatus::Pending {
                self.entries.remove(index);
                self.dirty = true;
                debug!(%identity, "pending request withdrawn");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::unix_now;

    fn identity(host: &str, pid: &str) -> ProcessIdentity {
        ProcessIdentity::new(host, pid).unwrap()
    }

    fn request(
        state: &mut StateFile,
        host: &str,
        pid: &str,
        mode: LockMode,
    ) -> LockResult<RequestOutcome> {
        state.request(&identity(host, pid), mode, unix_now())
    }

    #[test]
    fn first_reader_and_writer_are_granted_on_empty_state() {
        let mut state = StateFile::default();
        assert_eq!(
            request(&mut state, "H1", "1", LockMode::Read).unwrap(),
            RequestOutcome::Granted
        );

        let mut state = StateFile::default();
        assert_eq!(
            request(&mut state, "H1", "1", LockMode::Write).unwrap(),
            RequestOutcome::Granted
        );
        assert!(state.is_dirty());
    }

    #[test]
    fn readers_share_but_writers_wait() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();

        assert_eq!(
            request(&mut state, "H2", "2", LockMode::Read).unwrap(),
            RequestOutcome::Granted
        );
        assert_eq!(
            request(&mut state, "H3", "3", LockMode::Write).unwrap(),
            RequestOutcome::Pending
        );
        assert_eq!(state.entries().len(), 3);
    }

    #[test]
    fn granted_writer_excludes_everyone() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Write).unwrap();

        assert_eq!(
            request(&mut state, "H2", "2", LockMode::Read).unwrap(),
            RequestOutcome::Pending
        );
        assert_eq!(
            request(&mut state, "H3", "3", LockMode::Write).unwrap(),
            RequestOutcome::Pending
        );
    }

    #[test]
    fn pending_writer_flips_in_place_once_readers_drain() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();
        request(&mut state, "H2", "2", LockMode::Write).unwrap();

        state.remove(&identity("H1", "1")).unwrap();
        assert_eq!(
            request(&mut state, "H2", "2", LockMode::Write).unwrap(),
            RequestOutcome::Granted
        );
        // Upgraded in place, not re-created.
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.entries()[0].host, "H2");
        assert!(state.entries()[0].is_granted());
    }

    #[test]
    fn double_acquire_and_mode_switch_are_rejected() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();

        let err = request(&mut state, "H1", "1", LockMode::Read).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked(_)));

        let err = request(&mut state, "H1", "1", LockMode::Write).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked(_)));
    }

    #[test]
    fn pending_mode_switch_is_rejected() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Write).unwrap();
        request(&mut state, "H2", "2", LockMode::Write).unwrap();

        let err = request(&mut state, "H2", "2", LockMode::Read).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked(_)));
    }

    #[test]
    fn blocked_retry_refreshes_the_entry_time() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Write).unwrap();

        let reader = identity("H2", "2");
        state.request(&reader, LockMode::Read, 1_000).unwrap();
        state.dirty = false;

        // Same second: nothing to persist.
        state.request(&reader, LockMode::Read, 1_000).unwrap();
        assert!(!state.is_dirty());

        // Next second: the refresh must reach the file.
        state.request(&reader, LockMode::Read, 1_001).unwrap();
        assert!(state.is_dirty());
        let entry = &state.entries()[state.position(&reader).unwrap()];
        assert_eq!(entry.time, 1_001);
    }

    #[test]
    fn try_request_leaves_no_pending_entry() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();
        state.dirty = false;

        let outcome = state
            .try_request(&identity("H2", "2"), LockMode::Write, unix_now())
            .unwrap();
        assert_eq!(outcome, RequestOutcome::Pending);
        assert_eq!(state.entries().len(), 1);
        assert!(!state.is_dirty());
    }

    #[test]
    fn remove_without_entry_is_misuse() {
        let mut state = StateFile::default();
        let err = state.remove(&identity("H1", "1")).unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked(_)));
    }

    #[test]
    fn remove_preserves_order_of_remaining_entries() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();
        request(&mut state, "H2", "2", LockMode::Read).unwrap();
        request(&mut state, "H3", "3", LockMode::Read).unwrap();

        state.remove(&identity("H2", "2")).unwrap();
        let hosts: Vec<_> = state.entries().iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, ["H1", "H3"]);
    }

    #[test]
    fn abandon_only_removes_pending_entries() {
        let mut state = StateFile::default();
        request(&mut state, "H1", "1", LockMode::Read).unwrap();
        request(&mut state, "H2", "2", LockMode::Write).unwrap();

        // Granted entries stay.
        state.abandon(&identity("H1", "1"));
        assert!(state.position(&identity("H1", "1")).is_some());

        // Pending entries are withdrawn.
        state.abandon(&identity("H2", "2"));
        assert!(state.position(&identity("H2", "2")).is_none());

        // Absent entries are a no-op.
        state.abandon(&identity("H9", "9"));
    }
}
