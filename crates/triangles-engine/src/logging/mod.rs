//! Logging utilities.
//!
//! Everything in the workspace logs through the `log` facade; this module only
//! owns the one-time `env_logger` setup.

mod init;

pub use init::{LoggingConfig, init_logging};
