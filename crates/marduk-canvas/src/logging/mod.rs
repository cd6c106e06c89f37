//! Logging utilities.
//!
//! Every module logs through the `log` facade. Binaries and tests that want
//! output call [`init_logging`] once; library code never installs a logger.

mod init;

pub use init::{init_logging, LoggingConfig};
