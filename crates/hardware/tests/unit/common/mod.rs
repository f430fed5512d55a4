//! # Common Type Tests


/// Bit vectors and field helpers.
pub mod bits;

/// Error policy helpers and status codes.
pub mod error;
