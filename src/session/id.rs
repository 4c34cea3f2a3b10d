//! Session handle tokens.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RemoteShellError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const PREFIX: &str = "sess-";

/// Opaque handle returned to callers in place of the session itself.
///
/// Tokens come from a process-wide counter, so a closed session's token is
/// never handed out again during the lifetime of the process. The textual
/// form is `sess-` followed by at least eight lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next unused token.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the token.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Build a token from a raw value (tests and lookups by number).
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{:08x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = RemoteShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix(PREFIX)
            .filter(|hex| !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| RemoteShellError::SessionNotFound(s.to_string()))?;

        u64::from_str_radix(hex, 16)
            .map(SessionId)
            .map_err(|_| RemoteShellError::SessionNotFound(s.to_string()))
    }
}
