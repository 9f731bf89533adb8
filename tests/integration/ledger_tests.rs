//! Ledger store behaviour through the `LedgerPort` trait.

use crate::mock_hw::{Rig, at, day};

use moldguard::app::ports::LedgerPort;
use moldguard::ledger::{EventType, NewSession, SessionPatch, SessionStatus};

const HEADER: &str = "Session_ID,Date,Start_Time,End_Time,Event_Type,Status,Start_Hum,End_Hum,\
                      Target_Min,Actual_Min,Actual_Hours,Daily_Cumulative_Hours,Notes";

#[test]
fn written_session_reads_back_identically() {
    let mut rig = Rig::new(at(8, 0, 0));
    let session = NewSession {
        started_at: at(8, 0, 0),
        event_type: EventType::PrimaryRun,
        start_humidity: 66.5,
        target_secs: 5_200,
        daily_total_secs: 20_000.0,
        notes: "capped from 300m to 86m by daily budget".to_string(),
    };
    let id = rig.ledger.append_session(&session).unwrap();

    let rows = rig.rows();
    assert_eq!(rows, vec![session.into_record(id)]);
}

#[test]
fn file_starts_with_the_exact_header() {
    let mut rig = Rig::new(at(8, 0, 0));
    rig.ledger.ensure_integrity(day()).unwrap();
    let text = rig.file_text();
    assert_eq!(text.lines().next(), Some(HEADER));
}

#[test]
fn ensure_integrity_is_idempotent() {
    let mut rig = Rig::new(at(8, 0, 0));
    rig.open_row(EventType::SecondaryRun, at(8, 0, 0), 3_600);
    rig.ledger.ensure_integrity(day()).unwrap();
    let before = rig.file_text();
    rig.ledger.ensure_integrity(day()).unwrap();
    rig.ledger.ensure_integrity(day()).unwrap();
    assert_eq!(rig.file_text(), before);
}

#[test]
fn open_row_survives_file_deletion_via_backup() {
    let mut rig = Rig::new(at(8, 0, 0));
    let id = rig.open_row(EventType::PrimaryRun, at(8, 0, 0), 18_000);
    std::fs::remove_file(rig.ledger.path_for(day())).unwrap();

    // The next heartbeat recreates the file and patches the restored row.
    let patch = SessionPatch::heartbeat(600.0);
    assert!(rig.ledger.update_session(day(), id, &patch).unwrap());

    let rows = rig.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].session_id, id);
    assert_eq!(rows[0].actual_minutes, 10.0);
    assert!(rows[0].notes.starts_with("[RESTORED]"));
    assert!(rig.file_text().contains("INTEGRITY"));
}

#[test]
fn unparseable_rows_count_leniently_and_are_skipped_as_candidates() {
    let mut rig = Rig::new(at(12, 0, 0));
    let good = rig.closed_row(
        EventType::SecondaryRun,
        at(8, 0, 0),
        3_600,
        SessionStatus::Completed,
    );
    let path = rig.ledger.path_for(day());
    let mut text = rig.file_text();
    text.push_str("999,2026-10-16,not-a-time,10:00:00,SECONDARY_RUN,COMPLETED,60,50,60,60,1.0,1.0,\n");
    std::fs::write(&path, text).unwrap();

    let state = rig.ledger.scan_daily_state(day()).unwrap();
    assert_eq!(state.daily_total_secs, 7_200.0);
    assert_eq!(state.last_row.map(|r| r.session_id), Some(good));
}

#[test]
fn system_notes_never_count() {
    let mut rig = Rig::new(at(8, 0, 0));
    rig.ledger.write_system_note("BOOT", "hello").unwrap();
    rig.ledger
        .write_system_note("PANIC", "Actual_Hours would be 9.0")
        .unwrap();
    let state = rig.ledger.scan_daily_state(day()).unwrap();
    assert_eq!(state.daily_total_secs, 0.0);
    assert!(state.last_row.is_none());
    assert!(rig.rows().is_empty());
}
