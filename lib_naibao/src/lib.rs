//! Backend library for a family infant-feeding tracker.
//!
//! Storage, the recommendation engine, reference standards, the realtime
//! hub and the request-level services that tie them together. The server
//! binary in the `servers` crate wires these up behind HTTP.

/// Bearer token issuance and verification.
pub mod auth;
/// Layered application configuration.
pub mod configs;
/// Storage traits and backends.
pub mod connections;
/// Realtime hub, sessions and event publishing.
pub mod core;
/// Recommendation engine.
pub mod feeding;
/// Domain records.
pub mod models;
/// Request-level operations.
pub mod services;
/// Versioned reference standards.
pub mod standards;
/// Civil time helpers.
pub mod utils;

/// Tracing subscriber setup and log retention.
#[cfg(feature = "loggers")]
pub mod loggers;
