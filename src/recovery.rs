//! Startup recovery.
//!
//! Runs once, before the first decision cycle, and turns whatever the
//! ledger says into a definite engine mode.  The result depends only on
//! the ledger contents and the clock, so running it twice in a row lands
//! in the same state.
//!
//! ```text
//!  yesterday's last row RUNNING ──▶ OFF, close MIDNIGHT_STOP
//!
//!  today's last row:
//!    none ─────────────────────────────────────────▶ IDLE
//!    RUNNING, budget blown ──▶ OFF, DAILY_LIMIT_STOP ─▶ COOLDOWN (now)
//!    RUNNING, past target ───▶ OFF, CRASHED_OVERTIME ─▶ COOLDOWN (now)
//!    RUNNING, within target ─────────────────────────▶ RUNNING (resumed)
//!    closed < cooldown ago ──────────────────────────▶ COOLDOWN (end time)
//!    closed long ago ────────────────────────────────▶ IDLE
//! ```

use chrono::{NaiveDateTime, Timelike};
use log::{info, warn};

use crate::app::ports::{ActuatorPort, Clock, LedgerPort};
use crate::config::SystemConfig;
use crate::error::LedgerError;
use crate::ledger::{DailyState, SessionPatch, SessionRecord, SessionStatus};

/// Note kind of the startup marker row.
pub const BOOT_NOTE: &str = "BOOT";
/// Appended to the notes of a session picked up again after a restart.
pub const RESUMED_MARKER: &str = "[RESUMED after restart]";
/// Appended to the notes of a previous-day session closed at startup.
pub const STALE_MARKER: &str = "[STALE] closed at startup";

/// How recovery resolved today's ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No session rows today.
    Empty,
    /// Last session closed long enough ago.
    Idle,
    /// Last session closed less than a cooldown ago.
    Cooldown { anchor: NaiveDateTime },
    /// Open session within its target and the budget; keep running.
    Resume(SessionRecord),
    /// Open session closed because it had outlived its target.
    ClosedOvertime {
        session_id: u64,
        anchor: NaiveDateTime,
    },
    /// Open session closed because it had used up the daily budget.
    ClosedDailyLimit {
        session_id: u64,
        anchor: NaiveDateTime,
    },
}

impl Resolution {
    /// Cooldown anchor, if this resolution ends in COOLDOWN.
    pub fn cooldown_anchor(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Cooldown { anchor }
            | Self::ClosedOvertime { anchor, .. }
            | Self::ClosedDailyLimit { anchor, .. } => Some(*anchor),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Empty => "no sessions today; IDLE".to_string(),
            Self::Idle => "last session closed; IDLE".to_string(),
            Self::Cooldown { anchor } => format!("COOLDOWN anchored at {}", anchor.time()),
            Self::Resume(r) => format!(
                "session {} resumed ({} target {}s)",
                r.session_id,
                r.event_type.as_str(),
                r.target_secs()
            ),
            Self::ClosedOvertime { session_id, .. } => {
                format!("session {session_id} closed as CRASHED_OVERTIME; COOLDOWN")
            }
            Self::ClosedDailyLimit { session_id, .. } => {
                format!("session {session_id} closed as DAILY_LIMIT_STOP; COOLDOWN")
            }
        }
    }
}

/// Everything the service needs to start from where the ledger left off.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub at: NaiveDateTime,
    pub resolution: Resolution,
    /// Today's scan after recovery wrote its closures.
    pub daily: DailyState,
    /// Previous-day session closed as `MIDNIGHT_STOP`, if any.
    pub stale_closed: Option<u64>,
}

/// Resolve any unfinished session before the main loop starts.
///
/// Ledger errors propagate; actuator errors are logged and ignored.
pub fn recover(
    ledger: &mut impl LedgerPort,
    actuator: &mut impl ActuatorPort,
    clock: &impl Clock,
    config: &SystemConfig,
) -> Result<Recovery, LedgerError> {
    let now = clock.now();
    let now = now.with_nanosecond(0).unwrap_or(now);
    let today = now.date();
    let mut off_sent = false;

    // ── Previous day ──────────────────────────────────────────
    let mut stale_closed = None;
    if let Some(yesterday) = today.pred_opt().filter(|d| ledger.has_ledger(*d)) {
        let state = ledger.scan_daily_state(yesterday)?;
        if let Some(row) = state.last_row.filter(SessionRecord::is_open) {
            warn!(
                "Recovery: session {} from {yesterday} still RUNNING; closing at hard stop",
                row.session_id
            );
            force_off(actuator, &mut off_sent);
            let stop_at = yesterday.and_time(config.hard_stop_time);
            let elapsed = (stop_at - row.started_at()).num_seconds().max(0) as f64;
            let patch = SessionPatch::close(
                SessionStatus::MidnightStop,
                config.hard_stop_time,
                None,
                elapsed,
            )
            .with_notes(append_note(&row.notes, STALE_MARKER));
            ledger.update_session(yesterday, row.session_id, &patch)?;
            stale_closed = Some(row.session_id);
        }
    }

    // ── Today ─────────────────────────────────────────────────
    let scan = ledger.scan_daily_state(today)?;
    let resolution = match scan.last_row.clone() {
        None => Resolution::Empty,
        Some(row) if row.is_open() => {
            resolve_zombie(ledger, actuator, config, now, &scan, row, &mut off_sent)?
        }
        Some(row) => resolve_closed(config, now, &row),
    };

    if !matches!(resolution, Resolution::Resume(_)) {
        force_off(actuator, &mut off_sent);
    }

    let text = resolution.describe();
    info!("Recovery: {text}");
    ledger.write_system_note(BOOT_NOTE, &text)?;

    let daily = ledger.scan_daily_state(today)?;
    Ok(Recovery {
        at: now,
        resolution,
        daily,
        stale_closed,
    })
}

fn resolve_zombie(
    ledger: &mut impl LedgerPort,
    actuator: &mut impl ActuatorPort,
    config: &SystemConfig,
    now: NaiveDateTime,
    scan: &DailyState,
    row: SessionRecord,
    off_sent: &mut bool,
) -> Result<Resolution, LedgerError> {
    let elapsed = (now - row.started_at()).num_seconds().max(0) as f64;
    let target = f64::from(row.target_secs());
    let over_budget = scan.daily_total_secs + elapsed >= f64::from(config.daily_cap_secs);

    let status = if over_budget {
        SessionStatus::DailyLimitStop
    } else if elapsed > target {
        SessionStatus::CrashedOvertime
    } else {
        info!(
            "Recovery: resuming session {} ({elapsed:.0}s of {target:.0}s)",
            row.session_id
        );
        let mut row = row;
        if !row.notes.contains(RESUMED_MARKER) {
            let notes = append_note(&row.notes, RESUMED_MARKER);
            let patch = SessionPatch::heartbeat(elapsed).with_notes(notes);
            ledger.update_session(row.date, row.session_id, &patch)?;
            row.apply(&patch);
        }
        return Ok(Resolution::Resume(row));
    };

    warn!(
        "Recovery: session {} closed as {} after {elapsed:.0}s",
        row.session_id,
        status.as_str()
    );
    force_off(actuator, off_sent);
    let patch = SessionPatch::close(status, now.time(), None, elapsed);
    ledger.update_session(row.date, row.session_id, &patch)?;
    ledger.clear_backup();

    Ok(match status {
        SessionStatus::DailyLimitStop => Resolution::ClosedDailyLimit {
            session_id: row.session_id,
            anchor: now,
        },
        _ => Resolution::ClosedOvertime {
            session_id: row.session_id,
            anchor: now,
        },
    })
}

fn resolve_closed(config: &SystemConfig, now: NaiveDateTime, row: &SessionRecord) -> Resolution {
    let Some(end) = row.end_time else {
        return Resolution::Idle;
    };
    let anchor = row.date.and_time(end);
    let since = (now - anchor).num_seconds();
    if since < i64::from(config.cooldown_duration_secs) {
        Resolution::Cooldown { anchor }
    } else {
        Resolution::Idle
    }
}

fn force_off(actuator: &mut impl ActuatorPort, sent: &mut bool) {
    if *sent {
        return;
    }
    *sent = true;
    if let Err(e) = actuator.turn_off() {
        warn!("Recovery: OFF command failed: {e}");
    }
}

fn append_note(existing: &str, marker: &str) -> String {
    if existing.is_empty() {
        marker.to_string()
    } else {
        format!("{existing} {marker}")
    }
}
