//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters and real ledger files in a temp directory.

mod engine_scenarios;
mod ledger_tests;
mod mock_hw;
