//! # Connections Module
//!
//! This module handles the storage collaborator: the traits the services
//! consume and the backends that implement them.

/// Storage traits and the shared error type.
pub mod store;

/// In-process storage used by tests and database-less deployments.
pub mod memory;

/// Module for PostgreSQL database connection pooling and storage.
#[cfg(feature = "postgres")]
pub mod db_postgres;

pub use memory::MemoryStore;
pub use store::{
    AuditStorage, BabyStorage, FeedingStorage, FormulaStorage, GrowthStorage, InviteStorage,
    MembershipStorage, PreferenceStorage, SettingsStorage, StandardsStorage, Store, StoreError,
    StoreResult, WeaningPlanStorage,
};
