//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the FSM and its shared context.  It exposes a
//! clean, device-agnostic API.  All I/O flows through port traits
//! injected at call sites, making the entire service testable with mock
//! adapters.
//!
//! ```text
//!  AppInput ──▶ ┌────────────────────────┐ ──▶ EventSink
//!               │       AppService        │
//!  LedgerPort ◀▶│  scan · FSM · effects   │ ──▶ ActuatorPort
//!               └────────────────────────┘
//! ```
//!
//! One call to [`AppService::cycle`] is one decision: fresh ledger scan,
//! at most one FSM transition, then the requested effects in order.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, error, info, warn};

use crate::config::SystemConfig;
use crate::diagnostics::RunStats;
use crate::error::{ActuatorError, LedgerError};
use crate::fsm::context::{Effect, EngineState, FsmContext};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::ledger::{DailyState, SessionPatch, SessionStatus};
use crate::recovery::{Recovery, Resolution};

use super::events::{AppEvent, StatusLine};
use super::inputs::AppInput;
use super::ports::{ActuatorPort, Clock, EventSink, LedgerPort};

/// What the caller should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    /// The hard-stop moment passed; everything is closed, exit now.
    Shutdown,
}

/// `true` when `now` falls between the hard-stop moment and midnight.
pub fn in_hard_stop_window(config: &SystemConfig, now: NaiveDateTime) -> bool {
    now.time() >= config.hard_stop_time
}

/// A session close the ledger refused; re-issued every cycle until written.
#[derive(Debug, Clone)]
struct PendingClose {
    day: NaiveDate,
    session_id: u64,
    patch: SessionPatch,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<C: Clock> {
    fsm: Fsm,
    ctx: FsmContext,
    clock: C,
    stats: RunStats,
    last_cycle_at: NaiveDateTime,
    last_telemetry_at: NaiveDateTime,
    pending_close: Option<PendingClose>,
}

impl<C: Clock> AppService<C> {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM — call [`start`](Self::start) or
    /// [`start_from`](Self::start_from) next.
    pub fn new(config: SystemConfig, clock: C) -> Self {
        let now = truncate(clock.now());
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: FsmContext::new(config, now),
            clock,
            stats: RunStats::default(),
            last_cycle_at: now,
            last_telemetry_at: now,
            pending_close: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in IDLE with an empty day.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        self.ctx.now = self.now();
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {:?}", self.fsm.current_state());
    }

    /// Start from the mode startup recovery resolved.
    ///
    /// A resumed session re-asserts ON through the usual effect path.
    pub fn start_from(
        &mut self,
        recovery: &Recovery,
        ledger: &mut impl LedgerPort,
        actuator: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), LedgerError> {
        self.ctx.now = recovery.at;
        self.ctx.daily = recovery.daily.clone();
        self.fsm.start(&mut self.ctx);

        match &recovery.resolution {
            Resolution::Resume(row) => {
                self.ctx.humidity = Some(row.start_humidity);
                self.ctx.engine.current_session_id = Some(row.session_id);
                self.ctx.engine.current_target_secs = row.target_secs();
                self.ctx.engine.run_kind = Some(row.event_type);
                self.ctx.engine.resumed = true;
                self.fsm.force_transition(StateId::Running, &mut self.ctx);
                self.ctx.engine.mode_started_at = row.started_at();
            }
            other => {
                if let Some(anchor) = other.cooldown_anchor() {
                    self.fsm.force_transition(StateId::Cooldown, &mut self.ctx);
                    self.ctx.engine.mode_started_at = anchor;
                }
            }
        }
        self.apply_effects(ledger, actuator, sink)?;

        let state = self.fsm.current_state();
        sink.emit(&AppEvent::Started(state));
        info!("AppService started from recovery in {state:?}");
        Ok(())
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one full decision cycle: pending close → hard stop → scan → FSM
    /// → effects.
    ///
    /// Only fatal ledger errors are returned; everything else is logged,
    /// counted, and the input is consumed regardless.
    pub fn cycle(
        &mut self,
        input: AppInput,
        ledger: &mut impl LedgerPort,
        actuator: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<CycleOutcome, LedgerError> {
        let now = self.now();
        self.stats.cycles += 1;
        match input {
            AppInput::Reading(r) => {
                self.stats.readings += 1;
                self.ctx.humidity = Some(r.humidity_pct);
                self.ctx.fresh_reading = true;
            }
            AppInput::Tick => {
                self.stats.idle_ticks += 1;
                self.ctx.fresh_reading = false;
            }
        }

        // 0. A close that failed earlier goes first; until it lands the row
        //    stays RUNNING and IDLE will not open another.
        self.retry_pending_close(ledger, sink)?;

        // 1. Hard stop at the day boundary (also when the boundary was slept through)
        let crossed_midnight = now.date() > self.last_cycle_at.date();
        if in_hard_stop_window(&self.ctx.config, now) || crossed_midnight {
            let stop_at = if crossed_midnight {
                self.last_cycle_at.date().and_time(self.ctx.config.hard_stop_time)
            } else {
                now
            };
            self.hard_stop(stop_at, ledger, actuator, sink)?;
            return Ok(CycleOutcome::Shutdown);
        }
        self.last_cycle_at = now;
        self.ctx.now = now;

        // 2. Fresh ledger scan
        let prev_state = self.fsm.current_state();
        let scanned = match self.ledger_step(ledger.scan_daily_state(now.date()), "scan")? {
            Some(daily) => {
                self.ctx.daily = daily;
                true
            }
            None => false,
        };

        // 3. FSM tick (pure state logic).  Without a scan, IDLE must not
        //    start a run against a stale total.
        if scanned || prev_state != StateId::Idle {
            self.fsm.tick(&mut self.ctx);
        }

        // 4. Execute requested effects in order
        self.apply_effects(ledger, actuator, sink)?;

        // 5. Emit state change if the FSM moved
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }

        // 6. Status line and periodic telemetry
        sink.emit(&AppEvent::Status(self.status()));
        let since = (now - self.last_telemetry_at).num_seconds();
        if since >= i64::from(self.ctx.config.telemetry_interval_secs) {
            self.last_telemetry_at = now;
            sink.emit(&AppEvent::Telemetry(self.stats));
        }

        Ok(CycleOutcome::Continue)
    }

    /// Turn everything off and close any open session as `MIDNIGHT_STOP`.
    pub fn hard_stop(
        &mut self,
        at: NaiveDateTime,
        ledger: &mut impl LedgerPort,
        actuator: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), LedgerError> {
        info!("Hard stop at {at}");
        self.ctx.now = at;
        let prev_state = self.fsm.current_state();

        if prev_state == StateId::Running {
            self.ctx.close_status = SessionStatus::MidnightStop;
            self.fsm.force_transition(StateId::Cooldown, &mut self.ctx);
        } else {
            self.ctx.push(Effect::ActuatorOff);
        }
        self.apply_effects(ledger, actuator, sink)?;

        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
        sink.emit(&AppEvent::Telemetry(self.stats));
        sink.emit(&AppEvent::HardStop);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Status snapshot of the current cycle.
    pub fn status(&self) -> StatusLine {
        let state = self.fsm.current_state();
        let in_mode = self.ctx.secs_in_mode() as u32;
        let budget = self.ctx.budget();
        StatusLine {
            state,
            humidity: self.ctx.humidity,
            elapsed_secs: (state == StateId::Running).then_some(in_mode),
            target_secs: (state == StateId::Running)
                .then_some(self.ctx.engine.current_target_secs),
            cooldown_remaining_secs: (state == StateId::Cooldown)
                .then(|| self.ctx.config.cooldown_duration_secs.saturating_sub(in_mode)),
            used_secs: budget.used_secs(),
            cap_secs: budget.cap_secs(),
            cap_hit: state == StateId::Idle && self.ctx.cap_hit,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// The engine's value-object state.
    pub fn engine(&self) -> &EngineState {
        &self.ctx.engine
    }

    /// Ledger scan used by the last cycle.
    pub fn daily(&self) -> &DailyState {
        &self.ctx.daily
    }

    /// `true` while a session close is waiting to be written.
    pub fn has_pending_close(&self) -> bool {
        self.pending_close.is_some()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    /// Record the queue's drop counter for telemetry.
    pub fn record_dropped(&mut self, total: u64) {
        self.stats.dropped_readings = total;
    }

    /// How long the consumer may wait for a reading before it must run an
    /// idle cycle: the idle-poll interval, shortened so the hard-stop
    /// moment is never slept through.
    pub fn next_wake(&self) -> core::time::Duration {
        let now = self.now();
        let idle = i64::from(self.ctx.config.idle_poll_secs);
        let until_stop = (now.date().and_time(self.ctx.config.hard_stop_time) - now)
            .num_seconds()
            .max(0);
        let secs = if until_stop > 0 { idle.min(until_stop) } else { idle };
        core::time::Duration::from_secs(secs.max(0) as u64)
    }

    // ── Internal ──────────────────────────────────────────────

    fn now(&self) -> NaiveDateTime {
        truncate(self.clock.now())
    }

    /// Execute the effects the FSM handlers requested, in order.
    fn apply_effects(
        &mut self,
        ledger: &mut impl LedgerPort,
        actuator: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), LedgerError> {
        for effect in self.ctx.take_effects() {
            match effect {
                Effect::OpenSession(session) => {
                    let kind = session.event_type;
                    let target_secs = session.target_secs;
                    match self.ledger_step(ledger.append_session(&session), "append")? {
                        Some(id) => {
                            self.ctx.engine.current_session_id = Some(id);
                            self.stats.sessions_opened += 1;
                            sink.emit(&AppEvent::SessionOpened {
                                session_id: id,
                                kind,
                                target_secs,
                            });
                        }
                        None => {
                            // No durable row: never switch on.  Back to IDLE,
                            // drop the rest of this cycle's effects.
                            warn!("Start rolled back: session row could not be written");
                            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
                            self.ctx.take_effects();
                            return Ok(());
                        }
                    }
                }
                Effect::ActuatorOn => {
                    let r = actuator.turn_on();
                    self.actuator_step(r, "ON");
                }
                Effect::ActuatorOff => {
                    let r = actuator.turn_off();
                    self.actuator_step(r, "OFF");
                }
                Effect::Heartbeat {
                    day,
                    session_id,
                    elapsed_secs,
                } => {
                    let patch = SessionPatch::heartbeat(elapsed_secs);
                    if self.ledger_step(ledger.update_session(day, session_id, &patch), "heartbeat")?
                        == Some(false)
                    {
                        warn!("Heartbeat: session {session_id} not found in ledger");
                    }
                }
                Effect::CloseSession {
                    day,
                    session_id,
                    patch,
                } => {
                    let close = PendingClose {
                        day,
                        session_id,
                        patch,
                    };
                    self.close_session(close, ledger, sink)?;
                }
                // The backup is the only other copy of an unclosed row.
                Effect::ClearBackup if self.pending_close.is_some() => {
                    debug!("Backup kept until the pending close is written");
                }
                Effect::ClearBackup => ledger.clear_backup(),
                Effect::Note { kind, text } => {
                    self.ledger_step(ledger.write_system_note(kind, &text), "note")?;
                }
            }
        }
        Ok(())
    }

    /// Write a session close.  A recoverable failure parks it in
    /// `pending_close`; returns `true` once the close is on disk.
    fn close_session(
        &mut self,
        close: PendingClose,
        ledger: &mut impl LedgerPort,
        sink: &mut impl EventSink,
    ) -> Result<bool, LedgerError> {
        let session_id = close.session_id;
        let written = ledger.update_session(close.day, session_id, &close.patch);
        let Some(found) = self.ledger_step(written, "close")? else {
            warn!("Close of session {session_id} pending; retrying next cycle");
            self.pending_close = Some(close);
            return Ok(false);
        };
        if !found {
            warn!("Close: session {session_id} not found in ledger");
        }
        self.stats.sessions_closed += 1;
        sink.emit(&AppEvent::SessionClosed {
            session_id,
            status: close.patch.status.unwrap_or(SessionStatus::Completed),
            actual_secs: close.patch.actual_secs.unwrap_or_default(),
        });
        Ok(true)
    }

    fn retry_pending_close(
        &mut self,
        ledger: &mut impl LedgerPort,
        sink: &mut impl EventSink,
    ) -> Result<(), LedgerError> {
        let Some(close) = self.pending_close.take() else {
            return Ok(());
        };
        info!("Retrying close of session {}", close.session_id);
        if self.close_session(close, ledger, sink)? {
            ledger.clear_backup();
        }
        Ok(())
    }

    /// Fatal errors propagate; anything else is logged, counted and
    /// turned into `None`.
    fn ledger_step<T>(
        &mut self,
        result: Result<T, LedgerError>,
        what: &str,
    ) -> Result<Option<T>, LedgerError> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_fatal() => {
                error!("Ledger {what} failed fatally: {e}");
                Err(e)
            }
            Err(e) => {
                self.stats.ledger_failures += 1;
                warn!("Ledger {what} failed: {e}");
                Ok(None)
            }
        }
    }

    fn actuator_step(&mut self, result: Result<(), ActuatorError>, what: &str) {
        match result {
            Ok(()) => debug!("Actuator {what} ok"),
            Err(e) => {
                self.stats.actuator_failures += 1;
                warn!("Actuator {what} failed: {e}");
            }
        }
    }
}

fn truncate(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

/// Time left until the next local midnight, plus one second of margin.
pub fn until_next_day(now: NaiveDateTime) -> core::time::Duration {
    let next = now
        .date()
        .succ_opt()
        .map_or(now, |d| d.and_hms_opt(0, 0, 1).unwrap_or(now));
    let secs = (next - now).max(Duration::zero()).num_seconds();
    core::time::Duration::from_secs(secs as u64)
}
