//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (clock, actuator, ledger, event sinks, config file)
//! implement these traits.  The [`AppService`](super::service::AppService)
//! and [`recover`](crate::recovery::recover) consume them via generics, so
//! the decision core never touches a shell, a file or the wall clock
//! directly.
//!
//! All port errors are typed — callers must handle every variant explicitly.

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::SystemConfig;
use crate::error::{ActuatorError, ConfigError, LedgerError};
use crate::ledger::{DailyState, NewSession, SessionPatch, SessionRecord};

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: wall clock → domain)
// ───────────────────────────────────────────────────────────────

/// Local wall-clock time, truncated by implementations to whatever
/// resolution they like.  The ledger stores whole seconds.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → smart plug)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to switch the powered device.
///
/// Commands are always re-asserted; implementations must treat a repeated
/// `turn_off` as harmless.
pub trait ActuatorPort {
    fn turn_on(&mut self) -> Result<(), ActuatorError>;

    fn turn_off(&mut self) -> Result<(), ActuatorError>;

    /// Query the device.  Informational only; decisions never trust it.
    fn is_on(&mut self) -> Result<bool, ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Ledger port (driven adapter: domain ↔ durable session log)
// ───────────────────────────────────────────────────────────────

/// Durable, append/rewrite session log.  The only source of truth the
/// engine reads back after a restart.
pub trait LedgerPort {
    /// `true` when a file for `day` already exists.  Never creates one.
    fn has_ledger(&self, day: NaiveDate) -> bool;

    /// Make sure `day`'s file exists with the exact header, rebuilding it
    /// (and re-appending the in-memory backup) if it does not.
    fn ensure_integrity(&mut self, day: NaiveDate) -> Result<(), LedgerError>;

    /// Append a new `RUNNING` row and flush it to stable storage before
    /// returning its id.  Replaces the in-memory backup.
    fn append_session(&mut self, session: &NewSession) -> Result<u64, LedgerError>;

    /// Patch the row with `session_id` in `day`'s file.
    /// Returns `Ok(false)` when no such row exists.
    fn update_session(
        &mut self,
        day: NaiveDate,
        session_id: u64,
        patch: &SessionPatch,
    ) -> Result<bool, LedgerError>;

    /// One pass over `day`'s rows.
    fn scan_daily_state(&mut self, day: NaiveDate) -> Result<DailyState, LedgerError>;

    /// Append a non-accounting `SYSTEM` annotation to today's file.
    fn write_system_note(&mut self, kind: &str, text: &str) -> Result<(), LedgerError>;

    /// Forget the in-memory backup row.
    fn clear_backup(&mut self);

    /// Every well-formed session row of `day`, in file order.
    fn read_rows(&mut self, day: NaiveDate) -> Result<Vec<SessionRecord>, LedgerError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / status line)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (log records, a
/// terminal status line, a test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// never silently clamped.
pub trait ConfigPort {
    /// Load configuration.
    /// Returns [`ConfigError::NotFound`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}
