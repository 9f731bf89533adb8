//! CSV-backed [`LedgerPort`] implementation.
//!
//! Appends go straight to the end of the day's file and are fsync'd before
//! returning.  Updates copy every line through a temporary file in the same
//! directory, patch the matching row, fsync, and rename over the original.
//! Lines other than the patched one are copied as raw bytes, so a row that
//! no longer decodes is kept rather than dropped.
//! The containing directory is fsync'd afterwards on Unix so the rename
//! itself survives a power cut.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::{ByteRecord, ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::app::ports::{Clock, LedgerPort};
use crate::config::SystemConfig;
use crate::error::LedgerError;

use super::DailyState;
use super::record::{
    COLUMNS, EventType, LedgerRow, NewSession, RESTORED_MARKER, SessionPatch, SessionRecord,
    SessionStatus,
};

/// Annotation kind written whenever a file had to be rebuilt.
pub const INTEGRITY_NOTE: &str = "INTEGRITY";

/// Accounting rules the scan needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub primary_duration_secs: u32,
    pub primary_tolerance_secs: u32,
}

impl From<&SystemConfig> for LedgerPolicy {
    fn from(c: &SystemConfig) -> Self {
        Self {
            primary_duration_secs: c.primary_duration_secs,
            primary_tolerance_secs: c.primary_tolerance_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileHealth {
    Healthy,
    Missing,
    Malformed,
}

/// One CSV file per day under `dir`, named `<prefix>_<YYYY-MM-DD>_<Weekday>.csv`.
pub struct CsvLedger<C: Clock> {
    dir: PathBuf,
    prefix: String,
    policy: LedgerPolicy,
    clock: C,
    /// Most recently appended session, patched alongside the file.
    backup: Option<SessionRecord>,
    last_session_id: u64,
}

impl<C: Clock> CsvLedger<C> {
    /// Open the ledger described by `config`, creating its directory.
    pub fn open(config: &SystemConfig, clock: C) -> Result<Self, LedgerError> {
        Self::new(
            config.ledger_dir.clone(),
            config.ledger_prefix.clone(),
            LedgerPolicy::from(config),
            clock,
        )
    }

    pub fn new(
        dir: PathBuf,
        prefix: String,
        policy: LedgerPolicy,
        clock: C,
    ) -> Result<Self, LedgerError> {
        fs::create_dir_all(&dir).map_err(|source| LedgerError::Directory {
            path: dir.clone(),
            source,
        })?;
        debug!("Ledger directory ready: {}", dir.display());
        Ok(Self {
            dir,
            prefix,
            policy,
            clock,
            backup: None,
            last_session_id: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `day`'s rows.
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(file_name(&self.prefix, day))
    }

    /// The in-memory copy of the most recent session, if any.
    pub fn backup(&self) -> Option<&SessionRecord> {
        self.backup.as_ref()
    }

    // ── Internals ─────────────────────────────────────────────

    fn next_session_id(&mut self, at: NaiveDateTime) -> Result<u64, LedgerError> {
        let stamp =
            u64::try_from(at.and_utc().timestamp()).map_err(|_| LedgerError::SessionId)?;
        let id = stamp.max(self.last_session_id.saturating_add(1));
        if id == u64::MAX {
            return Err(LedgerError::SessionId);
        }
        self.last_session_id = id;
        Ok(id)
    }

    /// Seed the id counter from rows already on disk so a restart within
    /// the same second cannot reuse an id.
    fn seed_session_ids(&mut self, path: &Path) -> Result<(), LedgerError> {
        if self.last_session_id != 0 {
            return Ok(());
        }
        let max = read_ledger_rows(path)?
            .iter()
            .filter_map(|r| r.session_id.trim().parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.last_session_id = max;
        Ok(())
    }

    /// Re-append the backup when it belongs to `day` and its row is gone.
    /// Returns the restored id.
    fn restore_backup(&self, day: NaiveDate, path: &Path) -> Result<Option<u64>, LedgerError> {
        let Some(backup) = self.backup.as_ref().filter(|b| b.date == day) else {
            return Ok(None);
        };
        let id = backup.session_id.to_string();
        if read_ledger_rows(path)?
            .iter()
            .any(|r| r.session_id.trim() == id)
        {
            return Ok(None);
        }

        let mut row = LedgerRow::from(backup);
        row.notes = if row.notes.is_empty() {
            RESTORED_MARKER.to_string()
        } else {
            format!("{RESTORED_MARKER} {}", row.notes)
        };
        append_ledger_row(path, &row)?;
        warn!("Ledger {}: session {id} restored from memory", path.display());
        Ok(Some(backup.session_id))
    }

    fn note_integrity(&self, path: &Path, text: &str) -> Result<(), LedgerError> {
        let row = LedgerRow::system_note(self.clock.now(), INTEGRITY_NOTE, text);
        append_ledger_row(path, &row)
    }

    #[cfg(unix)]
    fn sync_dir(&self) {
        if let Err(e) = File::open(&self.dir).and_then(|d| d.sync_all()) {
            debug!("Directory fsync failed for {}: {e}", self.dir.display());
        }
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) {}

    fn create_fresh(&self, path: &Path) -> Result<(), LedgerError> {
        let tmp = NamedTempFile::new_in(&self.dir)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(tmp);
        wtr.write_record(COLUMNS)?;
        let tmp = finish(wtr)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        self.sync_dir();
        Ok(())
    }

    fn quarantine(&self, path: &Path) -> Result<(), LedgerError> {
        let stamp = self.clock.now().format("%H%M%S");
        let aside = path.with_extension(format!("corrupt-{stamp}"));
        fs::rename(path, &aside)?;
        warn!("Malformed ledger moved aside to {}", aside.display());
        Ok(())
    }
}

impl<C: Clock> LedgerPort for CsvLedger<C> {
    fn has_ledger(&self, day: NaiveDate) -> bool {
        self.path_for(day).is_file()
    }

    fn ensure_integrity(&mut self, day: NaiveDate) -> Result<(), LedgerError> {
        let path = self.path_for(day);
        let reason = match inspect(&path)? {
            FileHealth::Healthy => {
                if let Some(id) = self.restore_backup(day, &path)? {
                    self.note_integrity(
                        &path,
                        &format!("session {id} missing from ledger; restored from memory"),
                    )?;
                }
                return Ok(());
            }
            FileHealth::Missing => "missing",
            FileHealth::Malformed => {
                self.quarantine(&path)?;
                "malformed header"
            }
        };

        self.create_fresh(&path)?;
        let restored = self.restore_backup(day, &path)?;
        match (reason, restored) {
            ("missing", None) => info!("New ledger file {}", path.display()),
            (_, None) => {
                warn!("Ledger {} recreated ({reason})", path.display());
                self.note_integrity(&path, &format!("ledger recreated ({reason})"))?;
            }
            (_, Some(id)) => {
                warn!("Ledger {} recreated ({reason})", path.display());
                self.note_integrity(
                    &path,
                    &format!("ledger recreated ({reason}); session {id} restored from memory"),
                )?;
            }
        }
        Ok(())
    }

    fn append_session(&mut self, session: &NewSession) -> Result<u64, LedgerError> {
        let day = session.started_at.date();
        self.ensure_integrity(day)?;
        let path = self.path_for(day);
        self.seed_session_ids(&path)?;

        let id = self.next_session_id(session.started_at)?;
        let record = session.clone().into_record(id);
        append_ledger_row(&path, &LedgerRow::from(&record))?;
        debug!(
            "Session {id} appended ({}, target {:.2} min)",
            record.event_type.as_str(),
            record.target_minutes
        );
        self.backup = Some(record);
        Ok(id)
    }

    fn update_session(
        &mut self,
        day: NaiveDate,
        session_id: u64,
        patch: &SessionPatch,
    ) -> Result<bool, LedgerError> {
        if let Some(backup) = self.backup.as_mut().filter(|b| b.session_id == session_id) {
            backup.apply(patch);
        }
        self.ensure_integrity(day)?;
        let path = self.path_for(day);
        let id = session_id.to_string();
        let header = ByteRecord::from(COLUMNS.to_vec());

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        let tmp = NamedTempFile::new_in(&self.dir)?;
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(tmp);
        wtr.write_byte_record(&header)?;

        let mut found = false;
        for line in rdr.byte_records() {
            let record = line?;
            if record.get(0).map(<[u8]>::trim_ascii) != Some(id.as_bytes()) {
                wtr.write_byte_record(&record)?;
                continue;
            }
            match record.deserialize::<LedgerRow>(Some(&header)) {
                Ok(mut row) => {
                    row.apply(patch);
                    wtr.serialize(&row)?;
                    found = true;
                }
                Err(e) => {
                    warn!("Session {id} row unreadable, left untouched: {e}");
                    wtr.write_byte_record(&record)?;
                }
            }
        }

        if !found {
            debug!("Session {id} not in {}; update skipped", path.display());
            return Ok(false);
        }

        let tmp = finish(wtr)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;
        self.sync_dir();
        Ok(true)
    }

    fn scan_daily_state(&mut self, day: NaiveDate) -> Result<DailyState, LedgerError> {
        self.ensure_integrity(day)?;
        let path = self.path_for(day);
        let threshold = f64::from(
            self.policy
                .primary_duration_secs
                .saturating_sub(self.policy.primary_tolerance_secs),
        );

        let mut state = DailyState::default();
        for row in read_ledger_rows(&path)?.iter().filter(|r| !r.is_system()) {
            match row.status() {
                Some(SessionStatus::Running) => state.open_sessions += 1,
                status => {
                    if status.is_none() {
                        warn!(
                            "Ledger row {} has unknown status {:?}; counted as closed",
                            row.session_id, row.status
                        );
                    }
                    let secs = row.actual_secs_lenient();
                    state.daily_total_secs += secs;
                    if status.is_some()
                        && row.event_type() == Some(EventType::PrimaryRun)
                        && secs >= threshold
                    {
                        state.primary_done = true;
                    }
                }
            }
            match row.to_record() {
                Ok(record) => state.last_row = Some(record),
                Err(e) => debug!("Ledger row {} skipped as candidate: {e:?}", row.session_id),
            }
        }

        if state.open_sessions > 1 {
            warn!(
                "Ledger {} has {} RUNNING rows; only the last is considered",
                path.display(),
                state.open_sessions
            );
        }
        Ok(state)
    }

    fn write_system_note(&mut self, kind: &str, text: &str) -> Result<(), LedgerError> {
        let now = self.clock.now();
        self.ensure_integrity(now.date())?;
        append_ledger_row(&self.path_for(now.date()), &LedgerRow::system_note(now, kind, text))
    }

    fn clear_backup(&mut self) {
        self.backup = None;
    }

    fn read_rows(&mut self, day: NaiveDate) -> Result<Vec<SessionRecord>, LedgerError> {
        self.ensure_integrity(day)?;
        Ok(read_ledger_rows(&self.path_for(day))?
            .iter()
            .filter(|r| !r.is_system())
            .filter_map(|r| r.to_record().ok())
            .collect())
    }
}

// ───────────────────────────────────────────────────────────────
// File helpers
// ───────────────────────────────────────────────────────────────

/// `<prefix>_<YYYY-MM-DD>_<Weekday>.csv`
pub fn file_name(prefix: &str, day: NaiveDate) -> String {
    format!("{prefix}_{}.csv", day.format("%Y-%m-%d_%A"))
}

/// Append one row and fsync.  The file must already carry its header.
pub fn append_ledger_row(path: &Path, row: &LedgerRow) -> Result<(), LedgerError> {
    let file = OpenOptions::new().append(true).open(path)?;
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.serialize(row)?;
    let file = finish(wtr)?;
    file.sync_all()?;
    Ok(())
}

/// Flush a CSV writer and hand back the underlying file.
fn finish<W: std::io::Write>(mut wtr: csv::Writer<W>) -> Result<W, LedgerError> {
    wtr.flush()?;
    wtr.into_inner().map_err(|e| {
        LedgerError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })
}

/// Every row that deserializes; broken lines are logged and skipped.
fn read_ledger_rows(path: &Path) -> Result<Vec<LedgerRow>, LedgerError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for result in rdr.deserialize::<LedgerRow>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping unreadable row in {}: {e}", path.display()),
        }
    }
    Ok(rows)
}

fn inspect(path: &Path) -> Result<FileHealth, LedgerError> {
    match fs::metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileHealth::Missing),
        Err(e) => return Err(e.into()),
    }
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut first = StringRecord::new();
    match rdr.read_record(&mut first) {
        Ok(true) => {}
        Ok(false) => return Ok(FileHealth::Malformed),
        Err(e) => {
            warn!("Ledger {} header unreadable: {e}", path.display());
            return Ok(FileHealth::Malformed);
        }
    }
    let exact = first.len() == COLUMNS.len()
        && first.iter().zip(COLUMNS).all(|(got, want)| got.trim() == want);
    Ok(if exact {
        FileHealth::Healthy
    } else {
        FileHealth::Malformed
    })
}
