//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter            | Implements     | Connects to                   |
//! |--------------------|----------------|-------------------------------|
//! | `clock`            | Clock          | Host local time / manual time |
//! | `command_actuator` | ActuatorPort   | Smart-plug CLI via `sh -c`    |
//! | `sim_actuator`     | ActuatorPort   | In-memory plug                |
//! | `config_file`      | ConfigPort     | JSON file                     |
//! | `log_sink`         | EventSink      | `log` facade + status line    |
//! | `stdin_feed`       | (producer)     | stdin → reading queue         |
//!
//! The CSV ledger implements `LedgerPort` and lives in [`crate::ledger`].

pub mod clock;
pub mod command_actuator;
pub mod config_file;
pub mod log_sink;
pub mod sim_actuator;
pub mod stdin_feed;
