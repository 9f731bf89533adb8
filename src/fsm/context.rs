//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It carries the inputs of one decision cycle (wall-clock time,
//! latest humidity, a fresh ledger scan), the engine's own value-object
//! state, the configuration, and the ordered list of side effects the
//! handlers requested.  Think of it as the "blackboard" in a blackboard
//! architecture: handlers never touch the ledger or the actuator; the
//! [`AppService`](crate::app::service::AppService) executes the effects.

use chrono::{NaiveDate, NaiveDateTime};

use crate::budget::DailyBudget;
use crate::config::SystemConfig;
use crate::ledger::{DailyState, EventType, NewSession, SessionPatch, SessionStatus};

use super::StateId;

// ---------------------------------------------------------------------------
// Engine state (the value object persisted implicitly through the ledger)
// ---------------------------------------------------------------------------

/// Everything the engine remembers between cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub mode: StateId,
    /// RUNNING: session start.  COOLDOWN: cooldown anchor.  IDLE: entry time.
    pub mode_started_at: NaiveDateTime,
    /// Planned length of the open run (seconds); 0 outside RUNNING.
    pub current_target_secs: u32,
    pub current_session_id: Option<u64>,
    /// Trigger class of the open run.
    pub run_kind: Option<EventType>,
    /// The open run was picked up again after a restart.
    pub resumed: bool,
    /// Last time the open row's durations were rewritten.
    pub last_heartbeat_at: NaiveDateTime,
}

impl EngineState {
    pub fn idle(at: NaiveDateTime) -> Self {
        Self {
            mode: StateId::Idle,
            mode_started_at: at,
            current_target_secs: 0,
            current_session_id: None,
            run_kind: None,
            resumed: false,
            last_heartbeat_at: at,
        }
    }

    /// Whole seconds since `mode_started_at`, never negative.
    pub fn secs_in_mode(&self, now: NaiveDateTime) -> f64 {
        (now - self.mode_started_at).num_seconds().max(0) as f64
    }
}

/// A run that `Idle` decided to start; consumed by `running_enter`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRun {
    pub kind: EventType,
    pub target_secs: u32,
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Side effects (written by state handlers; executed by the service)
// ---------------------------------------------------------------------------

/// Requests emitted by handlers, executed strictly in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a `RUNNING` row; the service stores the assigned id.
    OpenSession(NewSession),
    ActuatorOn,
    ActuatorOff,
    /// Rewrite the open row's duration fields.
    Heartbeat {
        day: NaiveDate,
        session_id: u64,
        elapsed_secs: f64,
    },
    CloseSession {
        day: NaiveDate,
        session_id: u64,
        patch: SessionPatch,
    },
    ClearBackup,
    /// `SYSTEM` annotation row.
    Note { kind: &'static str, text: String },
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Cycle inputs --
    /// Wall-clock time of the current cycle.
    pub now: NaiveDateTime,
    /// Latest known humidity (%), carried across idle ticks.
    pub humidity: Option<f32>,
    /// `true` when this cycle was triggered by a new reading.
    pub fresh_reading: bool,
    /// Ledger scan taken at the start of this cycle.
    pub daily: DailyState,

    // -- Engine --
    pub engine: EngineState,
    /// Set by `idle_update`, consumed by `running_enter`.
    pub planned: Option<PlannedRun>,
    /// Status `running_exit` closes the session with.
    pub close_status: SessionStatus,
    /// Idle with the daily budget exhausted (status line only).
    pub cap_hit: bool,

    // -- Configuration --
    pub config: SystemConfig,

    // -- Outputs --
    pub effects: Vec<Effect>,
}

impl FsmContext {
    pub fn new(config: SystemConfig, now: NaiveDateTime) -> Self {
        Self {
            now,
            humidity: None,
            fresh_reading: false,
            daily: DailyState::default(),
            engine: EngineState::idle(now),
            planned: None,
            close_status: SessionStatus::Completed,
            cap_hit: false,
            config,
            effects: Vec::new(),
        }
    }

    /// Budget view over this cycle's scan.
    pub fn budget(&self) -> DailyBudget {
        DailyBudget::new(self.config.daily_cap_secs, self.daily.daily_total_secs)
    }

    /// Seconds since the current mode was entered (or anchored).
    pub fn secs_in_mode(&self) -> f64 {
        self.engine.secs_in_mode(self.now)
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    /// Drain the effects requested since the last call.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        core::mem::take(&mut self.effects)
    }
}
