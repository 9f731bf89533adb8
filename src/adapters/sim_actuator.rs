//! In-memory actuator for `--simulate` runs.
//!
//! Tracks the commanded state and logs each command; never fails unless
//! told to via [`SimActuator::fail_next`].

use log::info;

use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;

#[derive(Debug, Default)]
pub struct SimActuator {
    on: bool,
    commands: u64,
    fail_next: bool,
}

impl SimActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next command fail with [`ActuatorError::Unavailable`].
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Commands received so far, failed ones included.
    pub fn commands(&self) -> u64 {
        self.commands
    }

    fn command(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.commands += 1;
        if core::mem::take(&mut self.fail_next) {
            return Err(ActuatorError::Unavailable);
        }
        if self.on != on {
            info!("SIM | plug {}", if on { "ON" } else { "OFF" });
        }
        self.on = on;
        Ok(())
    }
}

impl ActuatorPort for SimActuator {
    fn turn_on(&mut self) -> Result<(), ActuatorError> {
        self.command(true)
    }

    fn turn_off(&mut self) -> Result<(), ActuatorError> {
        self.command(false)
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        Ok(self.on)
    }
}
