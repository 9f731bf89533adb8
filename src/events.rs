//! Reading queue between the sensor feed and the decision loop.
//!
//! Readings are produced by:
//! - the stdin feed thread (one value per line)
//! - any other adapter that owns a [`ReadingQueue`] handle
//!
//! They are consumed by the control loop, which processes them one at a
//! time, in arrival order.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Feed thread │────▶│  Reading Queue   │────▶│ Control Loop │
//! │ (producer)  │     │  (bounded, drop  │     │  (consumer)  │
//! └─────────────┘     │   oldest on full)│     └──────────────┘
//!                     └──────────────────┘
//! ```
//!
//! The producer never blocks.  When the queue is full the oldest pending
//! reading is discarded so the engine always sees the freshest data.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::app::inputs::{AppInput, HumidityReading};

/// Maximum number of pending readings.
pub const READING_QUEUE_DEPTH: usize = 16;

/// Bounded MPSC queue of humidity readings with a drop-oldest policy.
pub struct ReadingQueue {
    channel: Channel<CriticalSectionRawMutex, HumidityReading, READING_QUEUE_DEPTH>,
    dropped: AtomicU64,
}

impl Default for ReadingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a reading without blocking.
    /// Returns `false` if an older reading had to be dropped to make room.
    pub fn push(&self, reading: HumidityReading) -> bool {
        let mut pending = reading;
        let mut clean = true;
        loop {
            match self.channel.try_send(pending) {
                Ok(()) => return clean,
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    if self.channel.try_receive().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        clean = false;
                    }
                }
            }
        }
    }

    /// Pop the next reading, if any.
    pub fn try_pop(&self) -> Option<HumidityReading> {
        self.channel.try_receive().ok()
    }

    /// Wait for the next reading, or yield [`AppInput::Tick`] once `idle`
    /// passes without one.
    pub async fn next_input(&self, idle: Duration) -> AppInput {
        futures_lite::future::or(
            async { AppInput::Reading(self.channel.receive().await) },
            async {
                async_io_mini::Timer::after(idle).await;
                AppInput::Tick
            },
        )
        .await
    }

    /// Total readings discarded since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of pending readings.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
