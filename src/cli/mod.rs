//! Command-line interface
//!
//! Argument parsing for the `sealed-ledger` binary.

pub mod commands;

pub use commands::{Command, Opt};
