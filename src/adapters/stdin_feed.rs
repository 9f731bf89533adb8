//! Line-oriented humidity feed.
//!
//! Reads one value per line from any `BufRead` (stdin in production) on a
//! dedicated thread and pushes validated readings into a
//! [`ReadingQueue`].  Accepted forms: `66`, `66.5`, or `<anything>,66`
//! where the last comma-separated field is the humidity.

use std::io::BufRead;
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::app::inputs::HumidityReading;
use crate::app::ports::Clock;
use crate::events::ReadingQueue;

/// Parse a feed line into a humidity percentage.
///
/// Returns `None` for blank lines, comments (`#`), unparseable values and
/// anything outside 0–100.
pub fn parse_line(line: &str) -> Option<f32> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let field = line.rsplit(',').next()?.trim().trim_end_matches('%');
    let value: f32 = field.parse().ok()?;
    (value.is_finite() && (0.0..=100.0).contains(&value)).then_some(value)
}

/// Producer side of the reading queue.
pub struct StdinFeed;

impl StdinFeed {
    /// Spawn the feed thread over stdin.  Readings are timestamped with
    /// `clock` on arrival.
    pub fn spawn<C>(queue: &'static ReadingQueue, clock: C) -> std::io::Result<JoinHandle<()>>
    where
        C: Clock + Send + 'static,
    {
        std::thread::Builder::new()
            .name("stdin-feed".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                let n = pump(stdin.lock(), queue, &clock);
                info!("Feed: input closed after {n} readings");
            })
    }
}

/// Read `input` to the end, pushing every valid reading.  Returns the
/// number of readings accepted.
pub fn pump(input: impl BufRead, queue: &ReadingQueue, clock: &impl Clock) -> u64 {
    let mut accepted = 0;
    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Feed: read failed: {e}");
                break;
            }
        };
        let Some(reading) = parse_line(&line).and_then(|h| HumidityReading::new(clock.now(), h))
        else {
            if !line.trim().is_empty() {
                warn!("Feed: ignoring line {line:?}");
            }
            continue;
        };
        if !queue.push(reading) {
            debug!("Feed: queue full, oldest reading dropped");
        }
        accepted += 1;
    }
    accepted
}
