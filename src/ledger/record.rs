//! Session records and their on-disk row form.
//!
//! [`LedgerRow`] is the raw CSV shape: every column is text, so a row that
//! a human edited badly can still be read, copied through a rewrite, and
//! counted leniently.  [`SessionRecord`] is the typed view the engine and
//! recovery work with.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Exact ledger column list, in file order.
pub const COLUMNS: [&str; 13] = [
    "Session_ID",
    "Date",
    "Start_Time",
    "End_Time",
    "Event_Type",
    "Status",
    "Start_Hum",
    "End_Hum",
    "Target_Min",
    "Actual_Min",
    "Actual_Hours",
    "Daily_Cumulative_Hours",
    "Notes",
];

/// `Session_ID` value of annotation rows.
pub const SYSTEM_SESSION_ID: &str = "SYSTEM";
/// `Status` value of annotation rows.
pub const SYSTEM_STATUS: &str = "NOTE";
/// `End_Time` sentinel for a session that has not been closed.
pub const OPEN_END_TIME: &str = "...";
/// Prefix added to the notes of a row re-appended from the in-memory backup.
pub const RESTORED_MARKER: &str = "[RESTORED]";

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Which trigger class started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PrimaryRun,
    SecondaryRun,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryRun => "PRIMARY_RUN",
            Self::SecondaryRun => "SECONDARY_RUN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "PRIMARY_RUN" => Some(Self::PrimaryRun),
            "SECONDARY_RUN" => Some(Self::SecondaryRun),
            _ => None,
        }
    }
}

/// In-flight or terminal state of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Running,
    Completed,
    CrashedOvertime,
    CrashedResumed,
    DailyLimitStop,
    MidnightStop,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::CrashedOvertime => "CRASHED_OVERTIME",
            Self::CrashedResumed => "CRASHED_RESUMED",
            Self::DailyLimitStop => "DAILY_LIMIT_STOP",
            Self::MidnightStop => "MIDNIGHT_STOP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "CRASHED_OVERTIME" => Some(Self::CrashedOvertime),
            "CRASHED_RESUMED" => Some(Self::CrashedResumed),
            "DAILY_LIMIT_STOP" => Some(Self::DailyLimitStop),
            "MIDNIGHT_STOP" => Some(Self::MidnightStop),
            _ => None,
        }
    }

    /// Every status except `RUNNING` closes the session.
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

// ---------------------------------------------------------------------------
// Typed record
// ---------------------------------------------------------------------------

/// One control run attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: u64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// `None` while the session is open (`...` on disk).
    pub end_time: Option<NaiveTime>,
    pub event_type: EventType,
    pub status: SessionStatus,
    pub start_humidity: f32,
    pub end_humidity: Option<f32>,
    pub target_minutes: f64,
    pub actual_minutes: f64,
    pub actual_hours: f64,
    pub daily_cumulative_hours: f64,
    pub notes: String,
}

impl SessionRecord {
    pub fn started_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Planned duration, rounded back to whole seconds.
    pub fn target_secs(&self) -> u32 {
        (self.target_minutes * 60.0).round().max(0.0) as u32
    }

    /// Realized duration in whole seconds (`Actual_Hours` keeps four decimals).
    pub fn actual_secs(&self) -> f64 {
        (self.actual_hours * 3600.0).round()
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(end) = patch.end_time {
            self.end_time = Some(end);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(hum) = patch.end_humidity {
            self.end_humidity = Some(hum);
        }
        if let Some(secs) = patch.actual_secs {
            self.actual_minutes = minutes(secs);
            self.actual_hours = hours(secs);
        }
        if let Some(notes) = &patch.notes {
            self.notes.clone_from(notes);
        }
    }
}

/// Everything needed to open a new session row; the ledger assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub started_at: NaiveDateTime,
    pub event_type: EventType,
    pub start_humidity: f32,
    pub target_secs: u32,
    pub daily_total_secs: f64,
    pub notes: String,
}

impl NewSession {
    pub fn into_record(self, session_id: u64) -> SessionRecord {
        SessionRecord {
            session_id,
            date: self.started_at.date(),
            start_time: self.started_at.time(),
            end_time: None,
            event_type: self.event_type,
            status: SessionStatus::Running,
            start_humidity: self.start_humidity,
            end_humidity: None,
            target_minutes: minutes(f64::from(self.target_secs)),
            actual_minutes: 0.0,
            actual_hours: 0.0,
            daily_cumulative_hours: hours(self.daily_total_secs),
            notes: self.notes,
        }
    }
}

/// Field updates applied in place to an existing row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub end_time: Option<NaiveTime>,
    pub status: Option<SessionStatus>,
    pub end_humidity: Option<f32>,
    /// Realized duration; rewrites both `Actual_Min` and `Actual_Hours`.
    pub actual_secs: Option<f64>,
    pub notes: Option<String>,
}

impl SessionPatch {
    /// Duration-only update written while a session is still running.
    pub fn heartbeat(elapsed_secs: f64) -> Self {
        Self {
            actual_secs: Some(elapsed_secs),
            ..Self::default()
        }
    }

    /// Final update that closes a session.
    pub fn close(
        status: SessionStatus,
        ended_at: NaiveTime,
        end_humidity: Option<f32>,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            end_time: Some(ended_at),
            status: Some(status),
            end_humidity,
            actual_secs: Some(elapsed_secs),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Raw row
// ---------------------------------------------------------------------------

/// A ledger line exactly as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "Session_ID")]
    pub session_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Start_Time")]
    pub start_time: String,
    #[serde(rename = "End_Time")]
    pub end_time: String,
    #[serde(rename = "Event_Type")]
    pub event_type: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Start_Hum")]
    pub start_humidity: String,
    #[serde(rename = "End_Hum")]
    pub end_humidity: String,
    #[serde(rename = "Target_Min")]
    pub target_minutes: String,
    #[serde(rename = "Actual_Min")]
    pub actual_minutes: String,
    #[serde(rename = "Actual_Hours")]
    pub actual_hours: String,
    #[serde(rename = "Daily_Cumulative_Hours")]
    pub daily_cumulative_hours: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

/// Why a raw row could not be turned into a [`SessionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowError {
    SystemRow,
    SessionId,
    Date,
    StartTime,
    EventType,
    Status,
}

impl LedgerRow {
    /// Annotation row ignored by every accounting scan.
    pub fn system_note(at: NaiveDateTime, kind: &str, text: &str) -> Self {
        let time = at.format(TIME_FORMAT).to_string();
        Self {
            session_id: SYSTEM_SESSION_ID.to_string(),
            date: at.format(DATE_FORMAT).to_string(),
            start_time: time.clone(),
            end_time: time,
            event_type: kind.to_string(),
            status: SYSTEM_STATUS.to_string(),
            start_humidity: String::new(),
            end_humidity: String::new(),
            target_minutes: String::new(),
            actual_minutes: String::new(),
            actual_hours: String::new(),
            daily_cumulative_hours: String::new(),
            notes: text.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.session_id.trim() == SYSTEM_SESSION_ID
    }

    pub fn status(&self) -> Option<SessionStatus> {
        SessionStatus::parse(&self.status)
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::parse(&self.event_type)
    }

    /// `Actual_Hours` in whole seconds; malformed values count as zero.
    pub fn actual_secs_lenient(&self) -> f64 {
        (parse_or_zero(&self.actual_hours) * 3600.0).round()
    }

    /// Patch the text columns directly, leaving every other column verbatim.
    pub fn apply(&mut self, patch: &SessionPatch) {
        if let Some(end) = patch.end_time {
            self.end_time = end.format(TIME_FORMAT).to_string();
        }
        if let Some(status) = patch.status {
            self.status = status.as_str().to_string();
        }
        if let Some(hum) = patch.end_humidity {
            self.end_humidity = hum.to_string();
        }
        if let Some(secs) = patch.actual_secs {
            self.actual_minutes = minutes(secs).to_string();
            self.actual_hours = hours(secs).to_string();
        }
        if let Some(notes) = &patch.notes {
            self.notes.clone_from(notes);
        }
    }

    pub fn to_record(&self) -> Result<SessionRecord, RowError> {
        if self.is_system() {
            return Err(RowError::SystemRow);
        }
        let session_id = self
            .session_id
            .trim()
            .parse::<u64>()
            .map_err(|_| RowError::SessionId)?;
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .map_err(|_| RowError::Date)?;
        let start_time = NaiveTime::parse_from_str(self.start_time.trim(), TIME_FORMAT)
            .map_err(|_| RowError::StartTime)?;
        let event_type = self.event_type().ok_or(RowError::EventType)?;
        let status = self.status().ok_or(RowError::Status)?;
        let end_time = match self.end_time.trim() {
            OPEN_END_TIME | "" => None,
            raw => NaiveTime::parse_from_str(raw, TIME_FORMAT).ok(),
        };

        Ok(SessionRecord {
            session_id,
            date,
            start_time,
            end_time,
            event_type,
            status,
            start_humidity: self
                .start_humidity
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            end_humidity: self.end_humidity.trim().parse::<f32>().ok(),
            target_minutes: parse_or_zero(&self.target_minutes),
            actual_minutes: parse_or_zero(&self.actual_minutes),
            actual_hours: parse_or_zero(&self.actual_hours),
            daily_cumulative_hours: parse_or_zero(&self.daily_cumulative_hours),
            notes: self.notes.clone(),
        })
    }
}

impl From<&SessionRecord> for LedgerRow {
    fn from(r: &SessionRecord) -> Self {
        Self {
            session_id: r.session_id.to_string(),
            date: r.date.format(DATE_FORMAT).to_string(),
            start_time: r.start_time.format(TIME_FORMAT).to_string(),
            end_time: r.end_time.map_or_else(
                || OPEN_END_TIME.to_string(),
                |t| t.format(TIME_FORMAT).to_string(),
            ),
            event_type: r.event_type.as_str().to_string(),
            status: r.status.as_str().to_string(),
            start_humidity: r.start_humidity.to_string(),
            end_humidity: r.end_humidity.map(|h| h.to_string()).unwrap_or_default(),
            target_minutes: r.target_minutes.to_string(),
            actual_minutes: r.actual_minutes.to_string(),
            actual_hours: r.actual_hours.to_string(),
            daily_cumulative_hours: r.daily_cumulative_hours.to_string(),
            notes: r.notes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Seconds → minutes, two decimals.
pub fn minutes(secs: f64) -> f64 {
    (secs / 60.0 * 100.0).round() / 100.0
}

/// Seconds → hours, four decimals.
pub fn hours(secs: f64) -> f64 {
    (secs / 3600.0 * 10_000.0).round() / 10_000.0
}

fn parse_or_zero(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
