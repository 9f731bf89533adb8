//! Inbound inputs to the application service.
//!
//! The consumer loop turns whatever arrives from the reading queue (or the
//! lack of it) into exactly one [`AppInput`] per decision cycle.

use chrono::NaiveDateTime;

/// One sample from the humidity sensor feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityReading {
    /// When the producer received the sample.
    pub at: NaiveDateTime,
    /// Relative humidity, 0–100 %.
    pub humidity_pct: f32,
}

impl HumidityReading {
    /// `None` when `humidity_pct` is outside 0–100 or not a number.
    pub fn new(at: NaiveDateTime, humidity_pct: f32) -> Option<Self> {
        (0.0..=100.0)
            .contains(&humidity_pct)
            .then_some(Self { at, humidity_pct })
    }
}

/// What drives one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppInput {
    /// A new reading arrived.
    Reading(HumidityReading),
    /// No reading within the idle-poll interval; time-based rules only.
    Tick,
}
