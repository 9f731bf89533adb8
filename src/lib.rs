//! MoldGuard library.
//!
//! Humidity-triggered duty-cycle controller for a dehumidifier behind a
//! smart plug, with a crash-recoverable daily CSV ledger.  Exposes the
//! pure-logic modules for integration testing; the binary in `main.rs`
//! wires them to stdin, a shell-command actuator and the filesystem.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod budget;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fsm;
pub mod ledger;
pub mod recovery;
