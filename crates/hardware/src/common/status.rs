//! Driver-facing status codes.

use thiserror::Error;

/// Status returned by every driver-facing model call.
///
/// The discriminants match the driver ABI, so `status as i32` is the wire value.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum BfStatus {
    /// The call completed.
    #[error("success")]
    Success = 0,
    /// The model latched a fatal error; no further calls are served.
    #[error("model not ready")]
    NotReady = 1,
    /// No free table resources for the request.
    #[error("no system resources")]
    NoSysResources = 2,
    /// An argument is out of range or malformed.
    #[error("invalid argument")]
    InvalidArg = 3,
    /// The entry being added already exists.
    #[error("already exists")]
    AlreadyExists = 4,
    /// The entry or handle does not exist.
    #[error("object not found")]
    ObjectNotFound = 6,
    /// A fatal model error terminated the call.
    #[error("unexpected model failure")]
    Unexpected = 19,
}

impl BfStatus {
    /// Returns `true` for `Success`.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Converts into a `Result`, mapping `Success` to `Ok(())`.
    pub const fn into_result(self) -> Result<(), Self> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}
