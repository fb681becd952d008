//! Configuration management
//!
//! Settings are read from the environment once; the only one today is where the
//! ledger database lives (`LEDGER_DATA_DIR`, default `./data`).

pub mod settings;

pub use settings::{Config, DATA_DIR_KEY, GLOBAL_CONFIG};
