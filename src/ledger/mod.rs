//! Session ledger — one human-readable CSV file per calendar day.
//!
//! The ledger is both the audit trail and the only state that survives a
//! crash.  New sessions are appended and fsync'd; open sessions are patched
//! by rewriting the whole file through a temporary file and an atomic
//! rename, so the previous version stays valid until the rename lands.
//!
//! ```text
//!  append_session ──▶ [ ...rows | new RUNNING row ] ──fsync──▶ disk
//!  update_session ──▶ copy rows, patch one ──▶ tmp ──rename──▶ disk
//!  scan_daily_state ◀── read all rows once, skip SYSTEM annotations
//! ```

pub mod record;
pub mod store;

pub use record::{
    EventType, LedgerRow, NewSession, SessionPatch, SessionRecord, SessionStatus,
};
pub use store::{CsvLedger, LedgerPolicy};

/// Result of one pass over a day's ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyState {
    /// Sum of realized runtime over closed sessions (seconds).
    pub daily_total_secs: f64,
    /// A closed primary run reached (or nearly reached) its nominal length.
    pub primary_done: bool,
    /// Last well-formed session row, in file order.
    pub last_row: Option<SessionRecord>,
    /// Number of rows still marked `RUNNING`; more than one means corruption.
    pub open_sessions: usize,
}
