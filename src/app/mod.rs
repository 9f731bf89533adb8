//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules for the MoldGuard controller:
//! FSM orchestration, budget enforcement, and ledger bookkeeping.
//! All interaction with the clock, the plug and the disk happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real devices.

pub mod events;
pub mod inputs;
pub mod ports;
pub mod service;
