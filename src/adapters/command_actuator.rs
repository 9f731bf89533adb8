//! Shell-command actuator adapter.
//!
//! Bridges [`ActuatorPort`] to whatever CLI controls the smart plug.
//! Each operation runs one configured command through `sh -c` and waits
//! at most `timeout_secs` for it.  A non-zero exit is a failure; the
//! status command must print `on`/`off`, `true`/`false` or `1`/`0`.
//! Output pipes are drained on helper threads while the command runs, so
//! a chatty CLI cannot stall on a full pipe.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::app::ports::ActuatorPort;
use crate::config::ActuatorCommandConfig;
use crate::error::ActuatorError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct CommandActuator {
    config: ActuatorCommandConfig,
}

impl CommandActuator {
    pub fn new(config: ActuatorCommandConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.timeout_secs.max(1)))
    }

    /// Run `command`, returning its stdout.
    fn run(&self, command: &str) -> Result<String, ActuatorError> {
        debug!("Actuator: sh -c {command:?}");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                warn!("Actuator: cannot spawn shell: {e}");
                ActuatorError::Unavailable
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        // On timeout the drain threads are left to finish on their own.
        let status = wait_with_deadline(&mut child, self.timeout())?;
        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            return Err(ActuatorError::CommandFailed(format!(
                "{command:?} exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, ActuatorError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                if let Err(e) = child.kill() {
                    warn!("Actuator: failed to kill timed-out command: {e}");
                }
                // Reap the killed child; its exit status is irrelevant.
                let _ = child.wait();
                return Err(ActuatorError::Timeout);
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(ActuatorError::CommandFailed(e.to_string())),
        }
    }
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<String> {
    std::thread::spawn(move || read_pipe(pipe))
}

fn collect(reader: JoinHandle<String>) -> String {
    reader.join().unwrap_or_else(|_| {
        debug!("Actuator: output reader panicked");
        String::new()
    })
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut out = String::new();
    if let Some(mut p) = pipe {
        if let Err(e) = p.read_to_string(&mut out) {
            debug!("Actuator: unreadable command output: {e}");
        }
    }
    out
}

/// Interpret a status command's output.
pub fn parse_status(output: &str) -> Result<bool, ActuatorError> {
    match output.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(ActuatorError::InvalidResponse(other.to_string())),
    }
}

impl ActuatorPort for CommandActuator {
    fn turn_on(&mut self) -> Result<(), ActuatorError> {
        self.run(&self.config.on_command).map(drop)
    }

    fn turn_off(&mut self) -> Result<(), ActuatorError> {
        self.run(&self.config.off_command).map(drop)
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        let Some(cmd) = self.config.status_command.as_deref() else {
            return Err(ActuatorError::Unavailable);
        };
        parse_status(&self.run(cmd)?)
    }
}
