//! Keylock Demo - many workers contending for one lock
//!
//! - `config`: layered configuration (file, environment, command line)
//! - `logging`: console and rolling-file tracing output
//! - `service`: the contention run itself

pub mod config;
pub mod logging;
pub mod service;

pub use config::{Cli, Configuration, StoreKind};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use service::{ContentionReport, DemoSettings, run_contention};
