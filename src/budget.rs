//! Daily runtime budget.
//!
//! The budget is evaluated **every cycle before the FSM** from a fresh
//! ledger scan, so it never drifts from what is on disk.  State handlers
//! use it two ways:
//!
//! 1. On IDLE → RUNNING, [`DailyBudget::cap_target`] shrinks the nominal
//!    run to what is left of the cap, or suppresses it entirely when the
//!    remainder is below the minimal viable run.
//! 2. While RUNNING, [`DailyBudget::would_exceed`] stops the run as soon
//!    as closed runtime plus the open run's elapsed time reaches the cap.
//!
//! Because the open session is only re-checked once per cycle, the cap can
//! be overshot by at most one cycle (bounded by the heartbeat / idle-poll
//! interval).

/// Outcome of fitting a requested run into the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDecision {
    /// The nominal duration fits.
    Full(u32),
    /// The run was shortened to the remaining budget.
    Capped { requested: u32, capped: u32 },
    /// The remainder is below the minimal viable run; do not start.
    Suppressed { requested: u32, available: u32 },
}

/// Cap vs. used runtime for the current calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBudget {
    cap_secs: u32,
    used_secs: f64,
}

impl DailyBudget {
    pub fn new(cap_secs: u32, used_secs: f64) -> Self {
        Self {
            cap_secs,
            used_secs: used_secs.max(0.0),
        }
    }

    pub fn cap_secs(&self) -> u32 {
        self.cap_secs
    }

    pub fn used_secs(&self) -> f64 {
        self.used_secs
    }

    /// Whole seconds still available today.
    pub fn remaining_secs(&self) -> u32 {
        (f64::from(self.cap_secs) - self.used_secs).max(0.0).floor() as u32
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_secs >= f64::from(self.cap_secs)
    }

    /// Fit `requested` seconds into the remaining budget.
    pub fn cap_target(&self, requested: u32, min_viable_secs: u32) -> TargetDecision {
        let available = self.remaining_secs();
        if requested <= available {
            return TargetDecision::Full(requested);
        }
        if available < min_viable_secs || available == 0 {
            return TargetDecision::Suppressed {
                requested,
                available,
            };
        }
        TargetDecision::Capped {
            requested,
            capped: available,
        }
    }

    /// `true` once closed runtime plus `elapsed_secs` of the open run
    /// reaches the cap.
    pub fn would_exceed(&self, elapsed_secs: f64) -> bool {
        self.used_secs + elapsed_secs.max(0.0) >= f64::from(self.cap_secs)
    }
}
