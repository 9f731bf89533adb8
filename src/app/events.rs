//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them — structured log lines, a terminal
//! status line, or a recorder in tests.

use crate::diagnostics::RunStats;
use crate::fsm::StateId;
use crate::ledger::{EventType, SessionStatus};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Per-cycle status snapshot.
    Status(StatusLine),

    /// Periodic run statistics.
    Telemetry(RunStats),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A new session row was written and the actuator commanded on.
    SessionOpened {
        session_id: u64,
        kind: EventType,
        target_secs: u32,
    },

    /// An open session row was closed.
    SessionClosed {
        session_id: u64,
        status: SessionStatus,
        actual_secs: f64,
    },

    /// The hard-stop moment was reached; the process is about to exit.
    HardStop,

    /// The application service has started (carries initial state).
    Started(StateId),
}

/// What the status line shows after each cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub state: StateId,
    pub humidity: Option<f32>,
    /// RUNNING only.
    pub elapsed_secs: Option<u32>,
    /// RUNNING only.
    pub target_secs: Option<u32>,
    /// COOLDOWN only.
    pub cooldown_remaining_secs: Option<u32>,
    pub used_secs: f64,
    pub cap_secs: u32,
    /// IDLE with the daily budget exhausted.
    pub cap_hit: bool,
}

impl core::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:<8}", self.state.label())?;
        match self.humidity {
            Some(h) => write!(f, " | hum {h:5.1}%")?,
            None => write!(f, " | hum   n/a")?,
        }
        if let (Some(elapsed), Some(target)) = (self.elapsed_secs, self.target_secs) {
            write!(
                f,
                " | {:.1}m / {:.0}m",
                f64::from(elapsed) / 60.0,
                f64::from(target) / 60.0
            )?;
        }
        if let Some(left) = self.cooldown_remaining_secs {
            write!(f, " | rest {:.1}m", f64::from(left) / 60.0)?;
        }
        write!(
            f,
            " | today {:.2}h / {:.2}h",
            self.used_secs / 3600.0,
            f64::from(self.cap_secs) / 3600.0
        )?;
        if self.cap_hit {
            write!(f, " | DAILY CAP HIT")?;
        }
        Ok(())
    }
}
