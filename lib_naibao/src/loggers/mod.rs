/// Installs the global `tracing` subscriber with console and rolling file output.
pub mod loggerlocal;

pub use loggerlocal::{prune_old_logs, setup_logging, LoggingConfig, LoggingError, LoggingGuard};
