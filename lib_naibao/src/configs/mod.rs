//! # Configuration
//!
//! Application settings are layered: built-in defaults, then an optional
//! JSON file, then environment variables and command-line flags. The result
//! is resolved into the typed values each component takes at construction.

/// Layered application configuration.
pub mod config_app;

pub use config_app::{load_config, AppConfig, ConfigError};
