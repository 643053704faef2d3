//! Bearer token issuance and verification.

/// HS256 JWT handling.
pub mod token;

pub use token::{TokenClaims, TokenError, TokenService};
