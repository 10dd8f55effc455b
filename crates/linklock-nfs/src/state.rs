//! Textual state-file codec.
//!
//! The state file lists every known lock request, one per line, five
//! space-separated fields: host, pid, mode (`R`/`W`), status (`G`/`P`), and
//! the seconds-since-epoch time the entry was last written. Fields are
//! whitespace-free by construction, so spaces and line breaks are
//! interchangeable separators. The format is kept bit-compatible with
//! existing deployments.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write as _};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use linklock_core::error::{LockError, LockResult};
use tracing::debug;

use crate::identity::ProcessIdentity;

/// Requested sharing mode of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared access; any number of readers may be granted concurrently.
    Read,
    /// Exclusive access.
    Write,
}

impl LockMode {
    fn tag(self) -> char {
        match self {
            Self::Read => 'R',
            Self::Write => 'W',
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "R" => Some(Self::Read),
            "W" => Some(Self::Write),
            _ => None,
        }
    }
}

/// Grant status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The request is granted; the owner holds the lock.
    Granted,
    /// The request waits for the current holders to drain.
    Pending,
}

impl LockStatus {
    fn tag(self) -> char {
        match self {
            Self::Granted => 'G',
            Self::Pending => 'P',
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "G" => Some(Self::Granted),
            "P" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// One client's lock request as recorded in the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    /// Host component of the owning process's identity.
    pub host: String,
    /// Pid component of the owning process's identity.
    pub pid: String,
    /// Requested sharing mode.
    pub mode: LockMode,
    /// Grant status.
    pub status: LockStatus,
    /// Seconds since the epoch at which this entry was last written.
    pub time: i64,
}

impl ClientEntry {
    /// Whether this entry is currently granted.
    pub fn is_granted(&self) -> bool {
        self.status == LockStatus::Granted
    }

    pub(crate) fn belongs_to(&self, identity: &ProcessIdentity) -> bool {
        self.host == identity.host() && self.pid == identity.pid()
    }
}

/// All known lock requests, in file order.
///
/// Tracks whether the in-memory state diverged from the on-disk state so
/// callers can skip rewriting an unchanged file.
#[derive(Debug, Default)]
pub struct StateFile {
    pub(crate) entries: Vec<ClientEntry>,
    pub(crate) dirty: bool,
}

impl StateFile {
    /// Loads and parses the state file, discarding stale entries.
    ///
    /// A missing file is an empty state. Entries whose `time` is older than
    /// `entry_timeout` belonged to crashed or wedged peers and are dropped;
    /// dropping one marks the state dirty so the next dump persists the
    /// removal.
    pub fn load(path: &Path, entry_timeout: Duration) -> LockResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(LockError::io(path, e)),
        };

        let mut state = Self::parse(&text, path)?;
        let oldest_fresh = unix_now() - entry_timeout.as_secs() as i64;
        let before = state.entries.len();
        state.entries.retain(|entry| entry.time >= oldest_fresh);
        let dropped = before - state.entries.len();
        if dropped > 0 {
            state.dirty = true;
            debug!(dropped, path = %path.display(), "discarded stale entries");
        }
        Ok(state)
    }

    /// Parses state-file text. Only this codec ever writes the file, so a
    /// malformed entry means the directory was corrupted by a
    /// non-participant; that surfaces as an `InvalidData` error.
    fn parse(text: &str, path: &Path) -> LockResult<Self> {
        let mut entries = Vec::new();
        let mut fields = text.split_ascii_whitespace();

        while let Some(host) = fields.next() {
            let (Some(pid), Some(mode), Some(status), Some(time)) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed(path, "truncated entry"));
            };
            let Some(mode) = LockMode::from_tag(mode) else {
                return Err(malformed(path, &format!("bad mode field {mode:?}")));
            };
            let Some(status) = LockStatus::from_tag(status) else {
                return Err(malformed(path, &format!("bad status field {status:?}")));
            };
            let time: i64 = time
                .parse()
                .map_err(|_| malformed(path, &format!("bad time field {time:?}")))?;

            entries.push(ClientEntry {
                host: host.to_string(),
                pid: pid.to_string(),
                mode,
                status,
                time,
            });
        }

        Ok(Self {
            entries,
            dirty: false,
        })
    }

    /// Rewrites the state file by truncation, one line per entry in order.
    pub fn dump(&self, path: &Path) -> LockResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Participants may run as different users sharing the lock directory.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o777);
        }
        let mut file = options.open(path).map_err(|e| LockError::io(path, e))?;
        file.write_all(self.render().as_bytes())
            .map_err(|e| LockError::io(path, e))
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{} {} {} {} {}\n",
                entry.host,
                entry.pid,
                entry.mode.tag(),
                entry.status.tag(),
                entry.time
            ));
        }
        out
    }

    /// The entries in file order.
    pub fn entries(&self) -> &[ClientEntry] {
        &self.entries
    }

    /// Whether the in-memory state differs from the on-disk state.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Some granted entry, if any. When readers hold the lock several
    /// entries are granted and all of them are readers, so any one of them
    /// answers the admission question.
    pub fn granted(&self) -> Option<&ClientEntry> {
        self.entries.iter().find(|entry| entry.is_granted())
    }

    pub(crate) fn position(&self, identity: &ProcessIdentity) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.belongs_to(identity))
    }
}

fn malformed(path: &Path, what: &str) -> LockError {
    LockError::io(path, io::Error::new(ErrorKind::InvalidData, what.to_string()))
}

/// Seconds since the epoch. Clients' clocks are assumed to agree to within
/// small multiples of one second relative to the configured entry timeout.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(host: &str, pid: &str, mode: LockMode, status: LockStatus, time: i64) -> ClientEntry {
        ClientEntry {
            host: host.to_string(),
            pid: pid.to_string(),
            mode,
            status,
            time,
        }
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = StateFile::load(&dir.path().join("state"), Duration::from_secs(10)).unwrap();
        assert!(state.entries().is_empty());
        assert!(!state.is_dirty());
    }

    #[test]
    fn round_trips_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        let now = unix_now();

        let state = StateFile {
            entries: vec![
                entry("H1", "1", LockMode::Read, LockStatus::Granted, now),
                entry("H2", "2", LockMode::Write, LockStatus::Pending, now),
            ],
            dirty: true,
        };
        state.dump(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!("H1 1 R G {now}\nH2 2 W P {now}\n"));

        let reloaded = StateFile::load(&path, Duration::from_secs(10)).unwrap();
        assert_eq!(reloaded.entries(), state.entries());
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn stale_entries_are_dropped_and_mark_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        let now = unix_now();
        std::fs::write(&path, format!("H1 1 W G {}\nH2 2 R G {now}\n", now - 100)).unwrap();

        let state = StateFile::load(&path, Duration::from_secs(10)).unwrap();
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.entries()[0].host, "H2");
        assert!(state.is_dirty());
    }

    #[test]
    fn line_breaks_and_spaces_are_interchangeable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        let now = unix_now();
        std::fs::write(&path, format!("H1 1 R G {now} H2 2 R G {now}\n")).unwrap();

        let state = StateFile::load(&path, Duration::from_secs(10)).unwrap();
        assert_eq!(state.entries().len(), 2);
    }

    #[test]
    fn malformed_input_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");

        for text in ["H1 1 R G", "H1 1 X G 5", "H1 1 R Y 5", "H1 1 R G soon"] {
            std::fs::write(&path, text).unwrap();
            let err = StateFile::load(&path, Duration::from_secs(10)).unwrap_err();
            match err {
                LockError::Io { source, .. } => {
                    assert_eq!(source.kind(), ErrorKind::InvalidData, "for input {text:?}")
                }
                other => panic!("expected Io error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn granted_finds_any_granted_entry() {
        let now = unix_now();
        let state = StateFile {
            entries: vec![
                entry("H1", "1", LockMode::Write, LockStatus::Pending, now),
                entry("H2", "2", LockMode::Read, LockStatus::Granted, now),
            ],
            dirty: false,
        };
        assert_eq!(state.granted().unwrap().host, "H2");
    }
}
