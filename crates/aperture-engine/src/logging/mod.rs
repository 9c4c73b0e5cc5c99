//! Logger setup for binaries and tests.
//!
//! The engine itself only talks to the `log` facade; `env_logger` is wired up
//! here so hosts get the same filter syntax everywhere.

mod init;

pub use init::{init_logging, LoggingConfig};
