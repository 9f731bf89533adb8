//! Error types for the MoldGuard controller.
//!
//! Every subsystem has its own small enum.  The bootstrap path wraps them
//! in `anyhow`; the decision loop never bubbles them out: it logs them and
//! moves on to the next reading, except for the variants
//! [`LedgerError::is_fatal`] flags.

use core::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Ledger errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum LedgerError {
    /// Underlying file I/O failed.
    Io(std::io::Error),
    /// A row could not be encoded or the CSV stream was unreadable.
    Csv(csv::Error),
    /// The ledger directory does not exist and could not be created.
    Directory { path: PathBuf, source: std::io::Error },
    /// The wall clock cannot produce a session id.
    SessionId,
}

impl LedgerError {
    /// `true` when no further safe decision is possible without durable
    /// state, so the process should stop instead of retrying next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Directory { .. } | Self::SessionId)
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Csv(e) => write!(f, "CSV error: {e}"),
            Self::Directory { path, source } => {
                write!(f, "ledger directory {} unusable: {source}", path.display())
            }
            Self::SessionId => write!(f, "cannot derive a session id from the clock"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Directory { source: e, .. } => Some(e),
            Self::Csv(e) => Some(e),
            Self::SessionId => None,
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<tempfile::PersistError> for LedgerError {
    fn from(e: tempfile::PersistError) -> Self {
        Self::Io(e.error)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// The adapter ran the command but it reported failure.
    CommandFailed(String),
    /// The command did not finish in time.
    Timeout,
    /// The device could not be reached at all.
    Unavailable,
    /// A state query returned something that is neither on nor off.
    InvalidResponse(String),
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandFailed(msg) => write!(f, "command failed: {msg}"),
            Self::Timeout => write!(f, "command timed out"),
            Self::Unavailable => write!(f, "device unavailable"),
            Self::InvalidResponse(raw) => write!(f, "invalid state response: {raw:?}"),
        }
    }
}

impl std::error::Error for ActuatorError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// No config file at the given location.
    NotFound,
    /// Stored config failed to deserialize.
    Corrupted(String),
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error while reading or writing the file.
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
