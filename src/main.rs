//! MoldGuard — Main Entry Point
//!
//! Hexagonal architecture with a message-passing reading queue.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  StdinFeed        LogEventSink   JsonConfigFile   SystemClock  │
//! │  (producer)       (EventSink)    (ConfigPort)     (Clock)      │
//! │  CommandActuator / SimActuator   CsvLedger                     │
//! │  (ActuatorPort)                  (LedgerPort)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · daily budget · effects                          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Startup recovery · ReadingQueue (drop-oldest, idle ticks)     │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tracing_subscriber::EnvFilter;

use moldguard::adapters::clock::SystemClock;
use moldguard::adapters::command_actuator::CommandActuator;
use moldguard::adapters::config_file::JsonConfigFile;
use moldguard::adapters::log_sink::LogEventSink;
use moldguard::adapters::sim_actuator::SimActuator;
use moldguard::adapters::stdin_feed::StdinFeed;
use moldguard::app::ports::{ActuatorPort, Clock, ConfigPort};
use moldguard::app::service::{AppService, CycleOutcome, in_hard_stop_window, until_next_day};
use moldguard::diagnostics::install_panic_handler;
use moldguard::config::SystemConfig;
use moldguard::error::{ActuatorError, ConfigError};
use moldguard::events::ReadingQueue;
use moldguard::ledger::CsvLedger;
use moldguard::recovery::recover;

/// Shared between the feed thread (producer) and the control loop.
static READINGS: ReadingQueue = ReadingQueue::new();

/// Humidity-triggered dehumidifier controller with a daily session ledger.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "moldguard.json")]
    config: PathBuf,

    /// Override the ledger directory from the configuration
    #[arg(long)]
    ledger_dir: Option<PathBuf>,

    /// Drive an in-memory plug instead of the configured commands
    #[arg(long)]
    simulate: bool,

    /// Redraw a one-line status on stdout after every cycle
    #[arg(long)]
    status_line: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(long)]
    debug: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

/// The actuator chosen at startup.
enum Plug {
    Command(CommandActuator),
    Sim(SimActuator),
}

impl ActuatorPort for Plug {
    fn turn_on(&mut self) -> Result<(), ActuatorError> {
        match self {
            Self::Command(a) => a.turn_on(),
            Self::Sim(a) => a.turn_on(),
        }
    }

    fn turn_off(&mut self) -> Result<(), ActuatorError> {
        match self {
            Self::Command(a) => a.turn_off(),
            Self::Sim(a) => a.turn_off(),
        }
    }

    fn is_on(&mut self) -> Result<bool, ActuatorError> {
        match self {
            Self::Command(a) => a.is_on(),
            Self::Sim(a) => a.is_on(),
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // ── 1. Configuration ──────────────────────────────────────
    let config_file = JsonConfigFile::new(&cli.config);
    let mut config = match config_file.load() {
        Ok(config) => config,
        Err(ConfigError::NotFound) => {
            warn!("Config: {} not found, using defaults", cli.config.display());
            SystemConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("loading {}", cli.config.display()));
        }
    };
    if let Some(dir) = cli.ledger_dir {
        config.ledger_dir = dir;
    }
    config.validate().context("validating configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("MoldGuard v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Never start inside the hard-stop window ────────────
    let clock = SystemClock::new();
    let now = clock.now();
    if in_hard_stop_window(&config, now) {
        let wait = until_next_day(now);
        info!("Started inside the hard-stop window; waiting {}s", wait.as_secs());
        std::thread::sleep(wait);
    }

    // ── 3. Ledger + crash logging ─────────────────────────────
    let mut ledger = CsvLedger::open(&config, clock).context("opening ledger")?;
    install_panic_handler(config.ledger_dir.clone(), config.ledger_prefix.clone());

    // ── 4. Actuator ───────────────────────────────────────────
    let mut plug = if cli.simulate {
        info!("Actuator: simulated");
        Plug::Sim(SimActuator::new())
    } else {
        Plug::Command(CommandActuator::new(config.actuator.clone()))
    };
    match plug.is_on() {
        Ok(on) => info!("Actuator reports {}", if on { "ON" } else { "OFF" }),
        Err(e) => warn!("Actuator state unknown: {e}"),
    }

    // ── 5. Startup recovery ───────────────────────────────────
    let mut sink = LogEventSink::new().with_status_line(cli.status_line);
    let recovery = recover(&mut ledger, &mut plug, &clock, &config).context("startup recovery")?;

    let mut app = AppService::new(config, clock);
    app.start_from(&recovery, &mut ledger, &mut plug, &mut sink)
        .context("starting service")?;

    // ── 6. Sensor feed ────────────────────────────────────────
    StdinFeed::spawn(&READINGS, clock).context("spawning feed thread")?;

    info!("System ready. Entering control loop.");

    // ── 7. Control loop ───────────────────────────────────────
    futures_lite::future::block_on(async {
        loop {
            let input = READINGS.next_input(app.next_wake()).await;
            app.record_dropped(READINGS.dropped());
            match app.cycle(input, &mut ledger, &mut plug, &mut sink) {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Shutdown) => {
                    info!("Day closed; exiting");
                    return Ok(());
                }
                Err(e) => {
                    // Last-ditch OFF before giving up on durable state.
                    if let Err(off) = plug.turn_off() {
                        warn!("OFF on fatal error failed: {off}");
                    }
                    return Err(e).context("ledger failure");
                }
            }
        }
    })
}
