//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (rendered by whatever subscriber the binary installs).
//! With the status line enabled, each cycle's [`StatusLine`] is also
//! redrawn in place on stdout.

use std::io::Write;

use log::{debug, info, warn};

use crate::app::events::{AppEvent, StatusLine};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    status_line: bool,
    last_status: Option<String>,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also redraw a carriage-return status line on stdout.
    pub fn with_status_line(mut self, enabled: bool) -> Self {
        self.status_line = enabled;
        self
    }

    fn draw(&mut self, status: &StatusLine) {
        let text = status.to_string();
        if self.last_status.as_deref() == Some(text.as_str()) {
            return;
        }
        if self.status_line {
            let mut out = std::io::stdout().lock();
            // Status output is best-effort.
            let _ = write!(out, "\r{text:<80}");
            let _ = out.flush();
        } else {
            debug!("STATUS | {text}");
        }
        self.last_status = Some(text);
    }

    /// Move off the status line before a log line would overwrite it.
    fn break_line(&mut self) {
        if self.status_line && self.last_status.take().is_some() {
            println!();
        }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        if let AppEvent::Status(status) = event {
            self.draw(status);
            return;
        }
        self.break_line();
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | cycles={} readings={} ticks={} dropped={} | \
                     opened={} closed={} | ledger_err={} actuator_err={}",
                    t.cycles,
                    t.readings,
                    t.idle_ticks,
                    t.dropped_readings,
                    t.sessions_opened,
                    t.sessions_closed,
                    t.ledger_failures,
                    t.actuator_failures,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from.label(), to.label());
            }
            AppEvent::SessionOpened {
                session_id,
                kind,
                target_secs,
            } => {
                info!(
                    "SESSION | {session_id} opened | {} | target {:.0}m",
                    kind.as_str(),
                    f64::from(*target_secs) / 60.0
                );
            }
            AppEvent::SessionClosed {
                session_id,
                status,
                actual_secs,
            } => {
                info!(
                    "SESSION | {session_id} closed | {} | ran {:.1}m",
                    status.as_str(),
                    actual_secs / 60.0
                );
            }
            AppEvent::HardStop => warn!("HARD STOP | day closed, shutting down"),
            AppEvent::Started(state) => info!("START | initial_state={}", state.label()),
            AppEvent::Status(_) => {}
        }
    }
}
