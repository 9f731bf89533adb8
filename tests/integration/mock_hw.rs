//! Mock adapters for integration tests.
//!
//! Records every actuator command and every emitted event so tests can
//! assert on the full history.  Ledgers are real [`CsvLedger`]s in a
//! [`TempDir`], driven by a shared [`ManualClock`].

use chrono::{NaiveDate, NaiveDateTime};
use moldguard::adapters::clock::ManualClock;
use moldguard::app::events::AppEvent;
use moldguard::app::inputs::{AppInput, HumidityReading};
use moldguard::app::ports::{ActuatorPort, Clock, EventSink, LedgerPort};
use moldguard::app::service::AppService;
use moldguard::config::SystemConfig;
use moldguard::error::{ActuatorError, LedgerError};
use moldguard::ledger::{
    CsvLedger, DailyState, EventType, LedgerPolicy, NewSession, SessionPatch, SessionRecord,
    SessionStatus,
};
use tempfile::TempDir;

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugCall {
    On,
    Off,
}

// ── RecordingActuator ─────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub calls: Vec<PlugCall>,
    pub fail: bool,
}

#[allow(dead_code)]
impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// State implied by the last command (off when never commanded).
    pub fn commanded_on(&self) -> bool {
        self.calls.last() == Some(&PlugCall::On)
    }
}

impl ActuatorPort for RecordingActuator {
    fn turn_on(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(PlugCall::On);
        if self.fail {
            return Err(ActuatorError::Timeout);
        }
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(PlugCall::Off);
        if self.fail {
            return Err(ActuatorError::Timeout);
        }
        Ok(())
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        Ok(self.commanded_on())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saw(&self, pred: impl Fn(&AppEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── FlakyLedger ───────────────────────────────────────────────

/// Wraps a real ledger; appends and row updates fail with the configured
/// errors while set.
pub struct FlakyLedger<L> {
    pub inner: L,
    pub fail_appends: Option<fn() -> LedgerError>,
    pub fail_updates: Option<fn() -> LedgerError>,
}

#[allow(dead_code)]
impl<L> FlakyLedger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            fail_appends: None,
            fail_updates: None,
        }
    }
}

impl<L: LedgerPort> LedgerPort for FlakyLedger<L> {
    fn has_ledger(&self, day: NaiveDate) -> bool {
        self.inner.has_ledger(day)
    }

    fn ensure_integrity(&mut self, day: NaiveDate) -> Result<(), LedgerError> {
        self.inner.ensure_integrity(day)
    }

    fn append_session(&mut self, session: &NewSession) -> Result<u64, LedgerError> {
        match self.fail_appends {
            Some(make) => Err(make()),
            None => self.inner.append_session(session),
        }
    }

    fn update_session(
        &mut self,
        day: NaiveDate,
        session_id: u64,
        patch: &SessionPatch,
    ) -> Result<bool, LedgerError> {
        match self.fail_updates {
            Some(make) => Err(make()),
            None => self.inner.update_session(day, session_id, patch),
        }
    }

    fn scan_daily_state(&mut self, day: NaiveDate) -> Result<DailyState, LedgerError> {
        self.inner.scan_daily_state(day)
    }

    fn write_system_note(&mut self, kind: &str, text: &str) -> Result<(), LedgerError> {
        self.inner.write_system_note(kind, text)
    }

    fn clear_backup(&mut self) {
        self.inner.clear_backup();
    }

    fn read_rows(&mut self, day: NaiveDate) -> Result<Vec<SessionRecord>, LedgerError> {
        self.inner.read_rows(day)
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, s).unwrap()
}

/// A reading stamped with the clock's current time.
pub fn reading_at(clock: &ManualClock, humidity: f32) -> AppInput {
    AppInput::Reading(HumidityReading::new(clock.now(), humidity).unwrap())
}

/// Everything one test needs: a temp ledger directory, a clock shared by
/// all parts, and recording adapters.
pub struct Rig {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub config: SystemConfig,
    pub ledger: CsvLedger<ManualClock>,
    pub plug: RecordingActuator,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(start: NaiveDateTime) -> Self {
        Self::with_config(start, SystemConfig::default())
    }

    pub fn with_config(start: NaiveDateTime, mut config: SystemConfig) -> Self {
        let dir = TempDir::new().unwrap();
        config.ledger_dir = dir.path().to_path_buf();
        let clock = ManualClock::new(start);
        let ledger = CsvLedger::open(&config, clock.clone()).unwrap();
        Self {
            dir,
            clock,
            config,
            ledger,
            plug: RecordingActuator::new(),
            sink: RecordingSink::new(),
        }
    }

    /// A second ledger over the same directory, as after a process restart.
    pub fn reopen_ledger(&mut self) {
        self.ledger = CsvLedger::open(&self.config, self.clock.clone()).unwrap();
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy::from(&self.config)
    }

    /// Service started in IDLE with a fresh sink.
    pub fn service(&mut self) -> AppService<ManualClock> {
        let mut app = AppService::new(self.config.clone(), self.clock.clone());
        app.start(&mut self.sink);
        app
    }

    pub fn reading(&self, humidity: f32) -> AppInput {
        reading_at(&self.clock, humidity)
    }

    /// Feed one input through a full cycle.
    pub fn cycle(&mut self, app: &mut AppService<ManualClock>, input: AppInput) {
        app.cycle(input, &mut self.ledger, &mut self.plug, &mut self.sink)
            .unwrap();
    }

    /// Append an open session row directly, bypassing the engine.
    pub fn open_row(&mut self, kind: EventType, started_at: NaiveDateTime, target_secs: u32) -> u64 {
        self.ledger
            .append_session(&NewSession {
                started_at,
                event_type: kind,
                start_humidity: 66.0,
                target_secs,
                daily_total_secs: 0.0,
                notes: String::new(),
            })
            .unwrap()
    }

    /// Append a session row and close it after `secs`.
    pub fn closed_row(
        &mut self,
        kind: EventType,
        started_at: NaiveDateTime,
        secs: u32,
        status: SessionStatus,
    ) -> u64 {
        let id = self.open_row(kind, started_at, secs);
        let end = started_at + chrono::Duration::seconds(i64::from(secs));
        let patch = SessionPatch::close(status, end.time(), Some(50.0), f64::from(secs));
        assert!(self
            .ledger
            .update_session(started_at.date(), id, &patch)
            .unwrap());
        self.ledger.clear_backup();
        id
    }

    pub fn rows(&mut self) -> Vec<SessionRecord> {
        self.ledger.read_rows(self.clock.now().date()).unwrap()
    }

    pub fn rows_on(&mut self, day: NaiveDate) -> Vec<SessionRecord> {
        self.ledger.read_rows(day).unwrap()
    }

    /// Raw text of today's ledger file.
    pub fn file_text(&self) -> String {
        std::fs::read_to_string(self.ledger.path_for(self.clock.now().date())).unwrap()
    }
}
