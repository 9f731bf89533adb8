//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers — no closures, no
//! dynamic dispatch.  Handlers decide; they never perform I/O.  Ledger
//! writes and actuator commands are pushed onto `ctx.effects` in the
//! order they must happen.
//!
//! ```text
//!  IDLE ──[reading ≥ threshold, budget left]──▶ RUNNING
//!    ▲                                            │
//!    │                     [target reached | daily cap reached]
//!    │                                            ▼
//!    └───────────[cooldown elapsed]────────── COOLDOWN
//! ```

use log::{debug, info};

use super::context::{Effect, FsmContext, PlannedRun};
use super::{StateDescriptor, StateId};
use crate::budget::TargetDecision;
use crate::ledger::{EventType, NewSession, SessionPatch, SessionStatus};

/// `SYSTEM` note kind written when a cooldown ends.
pub const COOLDOWN_END_NOTE: &str = "COOLDOWN_END";

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — Running
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: Some(running_exit),
            on_update: running_update,
        },
        // Index 2 — Cooldown
        StateDescriptor {
            id: StateId::Cooldown,
            name: "Cooldown",
            on_enter: Some(cooldown_enter),
            on_exit: None,
            on_update: cooldown_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    ctx.engine.current_target_secs = 0;
    ctx.engine.current_session_id = None;
    ctx.engine.run_kind = None;
    ctx.engine.resumed = false;
    ctx.planned = None;
    info!("IDLE: monitoring humidity");
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    let budget = ctx.budget();
    ctx.cap_hit = budget.is_exhausted();

    // Idle ticks only drive time-based rules; a run needs a real reading.
    if !ctx.fresh_reading || ctx.cap_hit {
        return None;
    }
    let humidity = ctx.humidity?;

    // An unclosed row's runtime is not in the total yet.
    if ctx.daily.open_sessions > 0 {
        debug!(
            "IDLE: {} session row(s) still RUNNING in the ledger; not starting",
            ctx.daily.open_sessions
        );
        return None;
    }

    let (kind, requested) =
        if !ctx.daily.primary_done && humidity >= ctx.config.primary_threshold_pct {
            (EventType::PrimaryRun, ctx.config.primary_duration_secs)
        } else if humidity >= ctx.config.secondary_threshold_pct {
            (EventType::SecondaryRun, ctx.config.secondary_duration_secs)
        } else {
            return None;
        };

    let (target_secs, notes) = match budget.cap_target(requested, ctx.config.min_viable_run_secs) {
        TargetDecision::Full(secs) => (secs, String::new()),
        TargetDecision::Capped { requested, capped } => (
            capped,
            format!(
                "capped from {}m to {}m by daily budget",
                requested / 60,
                capped / 60
            ),
        ),
        TargetDecision::Suppressed {
            requested,
            available,
        } => {
            info!(
                "IDLE: {} suppressed at {humidity:.1}% ({available}s left of budget, wanted {requested}s)",
                kind.as_str()
            );
            return None;
        }
    };

    info!(
        "IDLE: {} triggered at {humidity:.1}% → target {target_secs}s",
        kind.as_str()
    );
    ctx.planned = Some(PlannedRun {
        kind,
        target_secs,
        notes,
    });
    Some(StateId::Running)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING state — actuator on, session row open
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut FsmContext) {
    ctx.close_status = SessionStatus::Completed;
    ctx.engine.last_heartbeat_at = ctx.now;

    // Resumed after restart: the row and the engine fields already exist.
    let Some(plan) = ctx.planned.take() else {
        info!(
            "RUNNING: resuming session {:?}, target {}s",
            ctx.engine.current_session_id, ctx.engine.current_target_secs
        );
        ctx.push(Effect::ActuatorOn);
        return;
    };

    ctx.engine.current_target_secs = plan.target_secs;
    ctx.engine.current_session_id = None;
    ctx.engine.run_kind = Some(plan.kind);
    ctx.engine.resumed = false;

    let session = NewSession {
        started_at: ctx.now,
        event_type: plan.kind,
        start_humidity: ctx.humidity.unwrap_or_default(),
        target_secs: plan.target_secs,
        daily_total_secs: ctx.daily.daily_total_secs,
        notes: plan.notes,
    };
    ctx.push(Effect::OpenSession(session));
    ctx.push(Effect::ActuatorOn);
}

fn running_exit(ctx: &mut FsmContext) {
    ctx.push(Effect::ActuatorOff);

    let Some(session_id) = ctx.engine.current_session_id else {
        debug!("RUNNING: exit without an open session row");
        return;
    };
    let elapsed = ctx.secs_in_mode();
    let patch = SessionPatch::close(ctx.close_status, ctx.now.time(), ctx.humidity, elapsed);
    info!(
        "RUNNING: session {session_id} closed as {} after {elapsed:.0}s",
        ctx.close_status.as_str()
    );
    ctx.push(Effect::CloseSession {
        day: ctx.engine.mode_started_at.date(),
        session_id,
        patch,
    });
    ctx.push(Effect::ClearBackup);
}

fn running_update(ctx: &mut FsmContext) -> Option<StateId> {
    let elapsed = ctx.secs_in_mode();

    if elapsed >= f64::from(ctx.engine.current_target_secs) {
        ctx.close_status = if ctx.engine.resumed {
            SessionStatus::CrashedResumed
        } else {
            SessionStatus::Completed
        };
        return Some(StateId::Cooldown);
    }

    if ctx.budget().would_exceed(elapsed) {
        info!(
            "RUNNING: daily cap reached ({:.0}s used + {elapsed:.0}s)",
            ctx.daily.daily_total_secs
        );
        ctx.close_status = SessionStatus::DailyLimitStop;
        return Some(StateId::Cooldown);
    }

    let since_heartbeat = (ctx.now - ctx.engine.last_heartbeat_at).num_seconds();
    if since_heartbeat >= i64::from(ctx.config.heartbeat_interval_secs) {
        if let Some(session_id) = ctx.engine.current_session_id {
            ctx.push(Effect::Heartbeat {
                day: ctx.engine.mode_started_at.date(),
                session_id,
                elapsed_secs: elapsed,
            });
        }
        ctx.engine.last_heartbeat_at = ctx.now;
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COOLDOWN state — mandatory rest after any run
// ═══════════════════════════════════════════════════════════════════════════

fn cooldown_enter(ctx: &mut FsmContext) {
    ctx.engine.current_target_secs = 0;
    ctx.engine.current_session_id = None;
    ctx.engine.run_kind = None;
    ctx.engine.resumed = false;
    info!(
        "COOLDOWN: resting for {}s",
        ctx.config.cooldown_duration_secs
    );
}

fn cooldown_update(ctx: &mut FsmContext) -> Option<StateId> {
    let rested = ctx.secs_in_mode();
    if rested < f64::from(ctx.config.cooldown_duration_secs) {
        return None;
    }

    let humidity = ctx
        .humidity
        .map_or_else(|| "n/a".to_string(), |h| format!("{h:.1}%"));
    ctx.push(Effect::Note {
        kind: COOLDOWN_END_NOTE,
        text: format!(
            "cooldown of {}m complete; humidity {humidity}",
            ctx.config.cooldown_duration_secs / 60
        ),
    });
    Some(StateId::Idle)
}
