//! Decision-cycle scenarios: AppService → FSM → ledger + actuator.

use crate::mock_hw::{FlakyLedger, PlugCall, Rig, at, day, reading_at};

use moldguard::app::events::AppEvent;
use moldguard::app::inputs::AppInput;
use moldguard::app::ports::LedgerPort;
use moldguard::app::service::CycleOutcome;
use moldguard::error::LedgerError;
use moldguard::fsm::StateId;
use moldguard::fsm::states::COOLDOWN_END_NOTE;
use moldguard::ledger::{EventType, SessionStatus};

// ── Starting runs ─────────────────────────────────────────────

#[test]
fn humid_morning_starts_primary_run() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();

    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.engine().current_target_secs, 18_000);
    assert_eq!(rig.plug.calls, vec![PlugCall::On]);

    let rows = rig.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SessionStatus::Running);
    assert_eq!(rows[0].event_type, EventType::PrimaryRun);
    assert_eq!(rows[0].target_minutes, 300.0);
    assert_eq!(rows[0].end_time, None);
    assert_eq!(Some(rows[0].session_id), app.engine().current_session_id);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::SessionOpened {
            kind: EventType::PrimaryRun,
            target_secs: 18_000,
            ..
        }
    )));
}

#[test]
fn run_is_capped_by_remaining_budget() {
    let mut rig = Rig::new(at(8, 0, 0));
    rig.closed_row(
        EventType::SecondaryRun,
        at(1, 0, 0),
        20_000,
        SessionStatus::Completed,
    );
    rig.clock.set(at(8, 0, 0));
    let mut app = rig.service();

    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.engine().current_target_secs, 5_200);
    let row = rig.rows().pop().unwrap();
    assert_eq!(row.event_type, EventType::PrimaryRun);
    assert_eq!(row.target_minutes, 86.67);
    assert_eq!(row.target_secs(), 5_200);
    assert_eq!(row.notes, "capped from 300m to 86m by daily budget");
}

#[test]
fn dry_air_leaves_everything_alone() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();

    let input = rig.reading(40.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Idle);
    assert!(rig.plug.calls.is_empty());
    assert!(rig.rows().is_empty());
    assert!(!rig.sink.saw(|e| matches!(e, AppEvent::StateChanged { .. })));
}

#[test]
fn secondary_run_once_primary_is_done() {
    let mut rig = Rig::new(at(12, 0, 0));
    rig.closed_row(
        EventType::PrimaryRun,
        at(1, 0, 0),
        18_000,
        SessionStatus::Completed,
    );
    let mut app = rig.service();

    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.engine().run_kind, Some(EventType::SecondaryRun));
    assert_eq!(app.engine().current_target_secs, 3_600);
}

#[test]
fn exhausted_budget_never_starts() {
    let mut rig = Rig::new(at(20, 0, 0));
    rig.closed_row(
        EventType::PrimaryRun,
        at(1, 0, 0),
        25_200,
        SessionStatus::Completed,
    );
    let mut app = rig.service();

    let input = rig.reading(95.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Idle);
    assert!(rig.plug.calls.is_empty());
    assert!(app.status().cap_hit);
    assert!(app.status().to_string().ends_with("DAILY CAP HIT"));
}

#[test]
fn sliver_of_budget_is_not_worth_a_run() {
    let mut rig = Rig::new(at(20, 0, 0));
    rig.closed_row(
        EventType::SecondaryRun,
        at(1, 0, 0),
        25_170,
        SessionStatus::Completed,
    );
    let mut app = rig.service();

    let input = rig.reading(70.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Idle);
    assert!(rig.plug.calls.is_empty());
    assert_eq!(rig.rows().len(), 1);
}

// ── Full lifecycle ────────────────────────────────────────────

#[test]
fn run_heartbeats_completes_and_cools_down() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();

    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);
    let id = app.engine().current_session_id.unwrap();

    // Heartbeat rewrites durations while the row stays open.
    rig.clock.advance_secs(30);
    rig.cycle(&mut app, AppInput::Tick);
    let row = rig.rows().pop().unwrap();
    assert_eq!(row.status, SessionStatus::Running);
    assert_eq!(row.actual_minutes, 0.5);

    // Target reached.
    rig.clock.set(at(13, 0, 0));
    rig.cycle(&mut app, AppInput::Tick);
    assert_eq!(app.state(), StateId::Cooldown);
    assert_eq!(rig.plug.calls, vec![PlugCall::On, PlugCall::Off]);

    let row = rig.rows().pop().unwrap();
    assert_eq!(row.session_id, id);
    assert_eq!(row.status, SessionStatus::Completed);
    assert_eq!(row.end_time, Some(at(13, 0, 0).time()));
    assert_eq!(row.actual_minutes, 300.0);
    assert_eq!(row.end_humidity, Some(66.0));
    assert!(app.daily().daily_total_secs == 0.0, "scan precedes the close");

    // High humidity during cooldown is ignored.
    rig.clock.advance_secs(60);
    let input = rig.reading(80.0);
    rig.cycle(&mut app, input);
    assert_eq!(app.state(), StateId::Cooldown);

    // Cooldown ends on an idle tick; the tick alone starts nothing.
    rig.clock.set(at(15, 30, 0));
    rig.cycle(&mut app, AppInput::Tick);
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(rig.plug.calls.len(), 2);
    assert!(rig.file_text().contains(COOLDOWN_END_NOTE));

    // Next reading: primary is done, so a secondary run starts.
    rig.clock.advance_secs(5);
    let input = rig.reading(80.0);
    rig.cycle(&mut app, input);
    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.engine().run_kind, Some(EventType::SecondaryRun));
    assert_eq!(app.daily().daily_total_secs, 18_000.0);
}

#[test]
fn only_one_transition_per_cycle() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();
    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    rig.clock.set(at(23, 0, 0));
    rig.cycle(&mut app, AppInput::Tick);
    // Long past both target and cooldown, but COOLDOWN is only entered.
    assert_eq!(app.state(), StateId::Cooldown);
}

// ── Failure handling ──────────────────────────────────────────

fn disk_full() -> LedgerError {
    LedgerError::Io(std::io::Error::other("disk full"))
}

fn id_exhausted() -> LedgerError {
    LedgerError::SessionId
}

#[test]
fn failed_append_rolls_back_without_switching_on() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();
    let mut ledger = FlakyLedger {
        fail_appends: Some(disk_full),
        ..FlakyLedger::new(rig.ledger)
    };

    let input = reading_at(&rig.clock, 66.0);
    let outcome = app
        .cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Continue);
    assert_eq!(app.state(), StateId::Idle);
    assert!(!rig.plug.commanded_on());
    assert!(!rig.plug.calls.contains(&PlugCall::On));
    assert_eq!(app.stats().ledger_failures, 1);
    assert_eq!(app.stats().sessions_opened, 0);

    // The disk recovers: the next reading starts normally.
    ledger.fail_appends = None;
    let input = reading_at(&rig.clock, 66.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Running);
    assert_eq!(rig.plug.calls.last(), Some(&PlugCall::On));
}

fn running_rows(ledger: &mut impl LedgerPort) -> usize {
    ledger
        .read_rows(day())
        .unwrap()
        .iter()
        .filter(|r| r.status == SessionStatus::Running)
        .count()
}

#[test]
fn failed_close_is_retried_until_written() {
    let mut rig = Rig::new(at(6, 0, 0));
    let mut app = rig.service();
    let mut ledger = FlakyLedger::new(rig.ledger);

    let input = reading_at(&rig.clock, 66.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    let id = app.engine().current_session_id.unwrap();

    // Target reached while the disk refuses rewrites.
    rig.clock.set(at(11, 0, 0));
    ledger.fail_updates = Some(disk_full);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Cooldown);
    assert_eq!(rig.plug.calls, vec![PlugCall::On, PlugCall::Off]);
    assert!(app.has_pending_close());
    assert_eq!(ledger.inner.backup().map(|b| b.session_id), Some(id));

    rig.clock.advance_secs(15);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert!(app.has_pending_close());
    assert_eq!(app.stats().ledger_failures, 2);
    assert_eq!(running_rows(&mut ledger), 1);

    // The disk recovers: the next cycle writes the original close.
    ledger.fail_updates = None;
    rig.clock.advance_secs(15);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert!(!app.has_pending_close());
    assert!(ledger.inner.backup().is_none());
    assert_eq!(running_rows(&mut ledger), 0);

    let row = ledger.read_rows(day()).unwrap().pop().unwrap();
    assert_eq!(row.session_id, id);
    assert_eq!(row.status, SessionStatus::Completed);
    assert_eq!(row.end_time, Some(at(11, 0, 0).time()));
    assert_eq!(row.actual_secs(), 18_000.0);

    let daily = ledger.scan_daily_state(day()).unwrap();
    assert_eq!(daily.daily_total_secs, 18_000.0);
    assert!(daily.primary_done);
    assert_eq!(app.daily().daily_total_secs, 18_000.0);
    assert_eq!(app.stats().sessions_closed, 1);
    assert!(rig.sink.saw(|e| matches!(
        e,
        AppEvent::SessionClosed { session_id, status: SessionStatus::Completed, .. }
            if *session_id == id
    )));
}

#[test]
fn unclosed_row_blocks_the_next_run() {
    let mut rig = Rig::new(at(6, 0, 0));
    let mut app = rig.service();
    let mut ledger = FlakyLedger::new(rig.ledger);

    let input = reading_at(&rig.clock, 66.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    rig.clock.set(at(11, 0, 0));
    ledger.fail_updates = Some(disk_full);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    // Cooldown runs out with the close still refused.
    rig.clock.set(at(13, 30, 0));
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Idle);

    rig.clock.set(at(14, 0, 0));
    let input = reading_at(&rig.clock, 70.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(rig.plug.calls, vec![PlugCall::On, PlugCall::Off]);
    assert_eq!(ledger.read_rows(day()).unwrap().len(), 1);

    // Once the close lands the full run counts and only a secondary fits.
    ledger.fail_updates = None;
    rig.clock.advance_secs(10);
    let input = reading_at(&rig.clock, 70.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.engine().run_kind, Some(EventType::SecondaryRun));
    assert_eq!(app.engine().current_target_secs, 3_600);
    assert_eq!(running_rows(&mut ledger), 1);
    assert_eq!(ledger.read_rows(day()).unwrap().len(), 2);
}

#[test]
fn failed_heartbeat_keeps_the_run_going() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();
    let mut ledger = FlakyLedger::new(rig.ledger);

    let input = reading_at(&rig.clock, 66.0);
    app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    ledger.fail_updates = Some(disk_full);
    rig.clock.advance_secs(30);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.stats().ledger_failures, 1);
    assert!(!app.has_pending_close());
    assert_eq!(rig.plug.calls, vec![PlugCall::On]);

    // The next heartbeat catches the row up.
    ledger.fail_updates = None;
    rig.clock.advance_secs(30);
    app.cycle(AppInput::Tick, &mut ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();
    let row = ledger.read_rows(day()).unwrap().pop().unwrap();
    assert_eq!(row.status, SessionStatus::Running);
    assert_eq!(row.actual_minutes, 1.0);
}

#[test]
fn fatal_ledger_error_stops_the_loop() {
    let mut rig = Rig::new(at(8, 0, 0));
    let mut app = rig.service();
    let mut ledger = FlakyLedger {
        fail_appends: Some(id_exhausted),
        ..FlakyLedger::new(rig.ledger)
    };

    let input = reading_at(&rig.clock, 66.0);
    let result = app.cycle(input, &mut ledger, &mut rig.plug, &mut rig.sink);

    assert!(matches!(result, Err(LedgerError::SessionId)));
    assert!(!rig.plug.calls.contains(&PlugCall::On));
}

#[test]
fn actuator_failure_is_counted_and_run_continues() {
    let mut rig = Rig::new(at(8, 0, 0));
    rig.plug.fail = true;
    let mut app = rig.service();

    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    assert_eq!(app.state(), StateId::Running);
    assert_eq!(app.stats().actuator_failures, 1);
    assert_eq!(rig.rows().len(), 1);

    // Commands keep being re-asserted on the way out.
    rig.plug.fail = false;
    rig.clock.set(at(13, 0, 0));
    rig.cycle(&mut app, AppInput::Tick);
    assert_eq!(rig.plug.calls, vec![PlugCall::On, PlugCall::Off]);
}

// ── Hard stop ─────────────────────────────────────────────────

#[test]
fn hard_stop_closes_open_run_as_midnight_stop() {
    let mut rig = Rig::new(at(22, 0, 0));
    let mut app = rig.service();
    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);

    rig.clock.set(at(23, 59, 58));
    let outcome = app
        .cycle(AppInput::Tick, &mut rig.ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Shutdown);
    assert_eq!(rig.plug.calls, vec![PlugCall::On, PlugCall::Off]);
    let row = rig.rows().pop().unwrap();
    assert_eq!(row.status, SessionStatus::MidnightStop);
    assert_eq!(row.end_time, Some(at(23, 59, 58).time()));
    assert!(rig.sink.saw(|e| matches!(e, AppEvent::HardStop)));
}

#[test]
fn slept_through_midnight_still_closes_yesterday() {
    let mut rig = Rig::new(at(23, 50, 0));
    let mut app = rig.service();
    let input = rig.reading(66.0);
    rig.cycle(&mut app, input);
    let id = app.engine().current_session_id.unwrap();

    rig.clock.set(day().succ_opt().unwrap().and_hms_opt(0, 5, 0).unwrap());
    let outcome = app
        .cycle(AppInput::Tick, &mut rig.ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Shutdown);
    let row = rig.rows_on(day()).pop().unwrap();
    assert_eq!(row.session_id, id);
    assert_eq!(row.status, SessionStatus::MidnightStop);
    assert_eq!(row.end_time, Some(at(23, 59, 58).time()));
    assert_eq!(row.actual_minutes, 9.97);
}

#[test]
fn hard_stop_while_idle_just_switches_off() {
    let mut rig = Rig::new(at(23, 59, 59));
    let mut app = rig.service();

    let input = rig.reading(90.0);
    let outcome = app
        .cycle(input, &mut rig.ledger, &mut rig.plug, &mut rig.sink)
        .unwrap();

    assert_eq!(outcome, CycleOutcome::Shutdown);
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(rig.plug.calls, vec![PlugCall::Off]);
    assert!(rig.rows().is_empty());
}
