//! General helpers shared across the library.

/// Civil-timezone wall-clock handling.
pub mod civil_time;

pub use civil_time::{BabyAge, CivilClock, CivilTimeError, FUTURE_GRACE_MINUTES};
