//! System configuration parameters
//!
//! All tunable parameters for the MoldGuard controller.  Values come from a
//! JSON file loaded through [`ConfigPort`](crate::app::ports::ConfigPort)
//! and stay fixed for the lifetime of the process.

use std::path::PathBuf;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Humidity thresholds ---
    /// Relative humidity (%) that triggers the once-a-day primary run
    pub primary_threshold_pct: f32,
    /// Relative humidity (%) that triggers a secondary run
    pub secondary_threshold_pct: f32,

    // --- Durations ---
    /// Nominal primary run length (seconds)
    pub primary_duration_secs: u32,
    /// Nominal secondary run length (seconds)
    pub secondary_duration_secs: u32,
    /// Mandatory rest after any run closes (seconds)
    pub cooldown_duration_secs: u32,

    // --- Budget ---
    /// Maximum cumulative actuator runtime per calendar day (seconds)
    pub daily_cap_secs: u32,
    /// Runs whose capped target falls below this are suppressed (seconds)
    pub min_viable_run_secs: u32,
    /// A closed primary run within this many seconds of the nominal
    /// duration counts as "primary done for today"
    pub primary_tolerance_secs: u32,

    // --- Timing ---
    /// How often an open session's duration fields are rewritten (seconds)
    pub heartbeat_interval_secs: u32,
    /// Wake the engine after this long without a reading (seconds)
    pub idle_poll_secs: u32,
    /// Telemetry report interval (seconds)
    pub telemetry_interval_secs: u32,
    /// Wall-clock moment at which the day is closed and the process exits
    pub hard_stop_time: NaiveTime,

    // --- Ledger ---
    /// Directory holding one ledger file per day
    pub ledger_dir: PathBuf,
    /// File-name prefix of ledger files
    pub ledger_prefix: String,

    // --- Actuator ---
    /// Shell commands used by the command actuator adapter
    pub actuator: ActuatorCommandConfig,
}

/// Shell commands bridging to whatever tool controls the smart plug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorCommandConfig {
    pub on_command: String,
    pub off_command: String,
    /// Optional; prints `on`/`off` (or `1`/`0`, `true`/`false`).
    pub status_command: Option<String>,
    /// Upper bound on a single command invocation (seconds)
    pub timeout_secs: u32,
}

impl Default for ActuatorCommandConfig {
    fn default() -> Self {
        Self {
            on_command: "plugctl on".to_string(),
            off_command: "plugctl off".to_string(),
            status_command: None,
            timeout_secs: 20,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Thresholds
            primary_threshold_pct: 65.0,
            secondary_threshold_pct: 55.0,

            // Durations
            primary_duration_secs: 18_000,  // 5 h
            secondary_duration_secs: 3_600, // 1 h
            cooldown_duration_secs: 9_000,  // 2.5 h

            // Budget
            daily_cap_secs: 25_200, // 7 h
            min_viable_run_secs: 60,
            primary_tolerance_secs: 300,

            // Timing
            heartbeat_interval_secs: 30,
            idle_poll_secs: 15,
            telemetry_interval_secs: 300,
            hard_stop_time: NaiveTime::from_hms_opt(23, 59, 58).unwrap_or(NaiveTime::MIN),

            // Ledger
            ledger_dir: PathBuf::from("ledger"),
            ledger_prefix: "MoldGuard".to_string(),

            actuator: ActuatorCommandConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.primary_threshold_pct) {
            return Err(ConfigError::ValidationFailed(
                "primary_threshold_pct must be 0–100",
            ));
        }
        if !(0.0..=100.0).contains(&self.secondary_threshold_pct) {
            return Err(ConfigError::ValidationFailed(
                "secondary_threshold_pct must be 0–100",
            ));
        }
        if self.secondary_threshold_pct > self.primary_threshold_pct {
            return Err(ConfigError::ValidationFailed(
                "secondary_threshold_pct must be <= primary_threshold_pct",
            ));
        }
        if self.primary_duration_secs == 0 || self.secondary_duration_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "run durations must be > 0",
            ));
        }
        if self.daily_cap_secs == 0 || self.daily_cap_secs > 86_400 {
            return Err(ConfigError::ValidationFailed(
                "daily_cap_secs must be 1–86400",
            ));
        }
        if self.min_viable_run_secs > self.secondary_duration_secs {
            return Err(ConfigError::ValidationFailed(
                "min_viable_run_secs must not exceed secondary_duration_secs",
            ));
        }
        if self.primary_tolerance_secs >= self.primary_duration_secs {
            return Err(ConfigError::ValidationFailed(
                "primary_tolerance_secs must be < primary_duration_secs",
            ));
        }
        if self.heartbeat_interval_secs == 0
            || self.heartbeat_interval_secs > self.secondary_duration_secs
        {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_interval_secs must be 1..=secondary_duration_secs",
            ));
        }
        if !(1..=3600).contains(&self.idle_poll_secs) {
            return Err(ConfigError::ValidationFailed(
                "idle_poll_secs must be 1–3600",
            ));
        }
        if self.telemetry_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "telemetry_interval_secs must be > 0",
            ));
        }
        if self.ledger_prefix.is_empty()
            || self
                .ledger_prefix
                .contains(|c: char| c == '/' || c == '\\' || c.is_control())
        {
            return Err(ConfigError::ValidationFailed(
                "ledger_prefix must be a non-empty plain file-name fragment",
            ));
        }
        Ok(())
    }
}
