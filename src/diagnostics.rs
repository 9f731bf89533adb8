//! Crash logging and runtime diagnostics.
//!
//! A custom panic handler appends a `SYSTEM` `PANIC` note to today's
//! ledger before the default handler runs, so the audit trail shows where
//! an unclean shutdown came from.  Startup recovery then resolves whatever
//! session the panic left open.
//!
//! Runtime counters ([`RunStats`]) are accumulated by the service and
//! emitted as periodic telemetry.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::adapters::clock::SystemClock;
use crate::app::ports::Clock;
use crate::error::LedgerError;
use crate::ledger::LedgerRow;
use crate::ledger::store::{append_ledger_row, file_name};

/// `SYSTEM` note kind written by the panic hook.
pub const PANIC_NOTE: &str = "PANIC";

const MAX_REASON_CHARS: usize = 200;

/// Counters accumulated since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub cycles: u64,
    pub readings: u64,
    pub idle_ticks: u64,
    /// Readings discarded by the drop-oldest queue policy.
    pub dropped_readings: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub ledger_failures: u64,
    pub actuator_failures: u64,
}

// ───────────────────────────────────────────────────────────────
// Custom panic handler — appends a PANIC note to the ledger
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that records the panic in today's ledger.
///
/// Call once during init, after the ledger directory exists.  The previous
/// hook still runs afterwards, so the usual message reaches stderr.
pub fn install_panic_handler(ledger_dir: PathBuf, prefix: String) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        let reason = match info.location() {
            Some(loc) => format!("{reason} at {}:{}", loc.file(), loc.line()),
            None => reason,
        };

        log::error!("PANIC: {reason}");
        match write_panic_note(&ledger_dir, &prefix, SystemClock.now(), &reason) {
            Ok(true) => {}
            Ok(false) => log::error!("Panic handler: no ledger for today, note not written"),
            Err(e) => log::error!("Panic handler: ledger note failed: {e}"),
        }

        previous(info);
    }));
}

/// Append a `PANIC` note to the ledger for `at`'s day.
///
/// Returns `Ok(false)` without touching the disk when that day's file does
/// not exist yet; the panic path never creates files.
pub fn write_panic_note(
    ledger_dir: &Path,
    prefix: &str,
    at: NaiveDateTime,
    reason: &str,
) -> Result<bool, LedgerError> {
    let path = ledger_dir.join(file_name(prefix, at.date()));
    if !path.is_file() {
        return Ok(false);
    }
    let reason: String = reason.chars().take(MAX_REASON_CHARS).collect();
    append_ledger_row(&path, &LedgerRow::system_note(at, PANIC_NOTE, &reason))?;
    Ok(true)
}
