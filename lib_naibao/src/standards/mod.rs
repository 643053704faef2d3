//! # Standards Lookup
//!
//! Read-only access to versioned health reference tables. Only the single
//! active version is ever consulted, and every query degrades to `None` so
//! that callers can substitute their own constants.

/// Payload parsing and range text formatting.
pub mod range;
/// Active-version resolution and age-bucket matching.
pub mod lookup;

pub use lookup::{
    compare_versions, default_height_gain_text, default_weight_gain_text, order_entries,
    pick_by_age_range, resolve_active_version, StandardsLookup,
};
pub use range::{format_range_text, parse_range_data, RangeData};
