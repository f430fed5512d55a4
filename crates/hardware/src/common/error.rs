//! Model error types.
//!
//! This module defines how the model reports failures. It provides:
//! 1. **Fatal errors:** `ModelError` aborts the current operation; it is caught at the
//!    driver-call boundary in `sim::Simulation` and never silently discarded.
//! 2. **Assertions:** `model_assert!` turns an internal-consistency violation into an
//!    `Err` instead of a panic so the boundary can log and latch the fault.
//! 3. **Policy checks:** `config_check` applies the relaxed/strict policy used by every
//!    `relax_*` flag: relaxed checks only warn, strict checks fail the operation.

use thiserror::Error;

use super::address::AddressError;

/// Fatal model errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ModelError {
    /// An internal invariant was violated; indicates a bug in the model itself.
    #[error("internal consistency failure in {context}: {detail}")]
    Invariant {
        /// Component that detected the failure.
        context: &'static str,
        /// Human readable description.
        detail: String,
    },

    /// A strict configuration-consistency check failed.
    #[error("configuration check failed in {context}: {detail}")]
    Config {
        /// Component that ran the check.
        context: &'static str,
        /// Human readable description.
        detail: String,
    },

    /// An address could not be decoded and no allow-bad policy absorbed it.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// An instruction-bus operation arrived while an atomic batch was open.
    #[error("operation {op} refused: atomic update in progress")]
    AtomicInProgress {
        /// Operation name.
        op: &'static str,
    },
}

/// Result alias used throughout the model core.
pub type ModelResult<T> = Result<T, ModelError>;

/// Returns `Err(ModelError::Invariant)` from the enclosing function when `cond` is false.
///
/// The failure is logged at `error` level before returning.
#[macro_export]
macro_rules! model_assert {
    ($cond:expr, $context:expr, $($arg:tt)+) => {
        if !$cond {
            let detail = format!($($arg)+);
            ::tracing::error!(context = $context, %detail, "model assertion failed");
            return Err($crate::common::error::ModelError::Invariant {
                context: $context,
                detail,
            });
        }
    };
}

/// Applies the relaxed/strict policy to a failed consistency check.
///
/// # Arguments
///
/// * `relaxed` - Value of the governing `relax_*` flag.
/// * `context` - Component running the check.
/// * `detail` - Description of the inconsistency.
///
/// # Returns
///
/// `Ok(())` after a warning when relaxed, otherwise `ModelError::Config`.
pub fn config_check(relaxed: bool, context: &'static str, detail: String) -> ModelResult<()> {
    if relaxed {
        tracing::warn!(context, %detail, "relaxed consistency check");
        Ok(())
    } else {
        tracing::error!(context, %detail, "consistency check failed");
        Err(ModelError::Config { context, detail })
    }
}
