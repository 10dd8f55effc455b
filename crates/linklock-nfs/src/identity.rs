//! Process identity used to key state-file entries.

use std::fmt;

use linklock_core::error::{LockError, LockResult};

/// Identity of a participating process, as recorded in the state file.
///
/// Both components are whitespace-free by construction: the state file is
/// tokenized on spaces and line breaks, so every ASCII space is replaced
/// with `_` before use. Peers on all hosts must produce identities the same
/// way for `(host, pid)` to be unique across the lock directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    host: String,
    pid: String,
}

impl ProcessIdentity {
    /// Builds an identity from explicit components.
    ///
    /// Spaces are replaced with `_`. Components that are empty or contain
    /// other whitespace are rejected, since they would corrupt the state
    /// file.
    pub fn new(host: impl Into<String>, pid: impl Into<String>) -> LockResult<Self> {
        Ok(Self {
            host: normalize("identity host", host.into())?,
            pid: normalize("identity pid", pid.into())?,
        })
    }

    /// Builds the default identity: the OS hostname and the decimal
    /// process id.
    pub fn from_os() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            host: host.replace(' ', "_"),
            pid: std::process::id().to_string(),
        }
    }

    /// The host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The pid component.
    pub fn pid(&self) -> &str {
        &self.pid
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.host, self.pid)
    }
}

fn normalize(what: &str, value: String) -> LockResult<String> {
    let value = value.replace(' ', "_");
    if value.is_empty() {
        return Err(LockError::InvalidName(format!("{what} must be non-empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(LockError::InvalidName(format!(
            "{what} must not contain whitespace: {value:?}"
        )));
    }
    Ok(value)
}
