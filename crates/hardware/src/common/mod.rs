//! Common utilities and types used throughout the model.
//!
//! This module provides the building blocks every MAU component depends on:
//! 1. **Bit vectors:** Fixed-width words and signed field helpers.
//! 2. **Addresses:** The PBUS address format with total encode/decode.
//! 3. **Constants:** Poison values, address layout and RAM geometry.
//! 4. **Errors:** Fatal model errors, the relaxed/strict check policy and the
//!    status codes returned to the driver.

/// PBUS address encoding and decoding.
pub mod address;

/// Fixed-width bit vectors.
pub mod bits;

/// Model-wide constants.
pub mod constants;

/// Error types and assertion helpers.
pub mod error;

/// Driver-facing status codes.
pub mod status;

pub use address::{
    Address, AddressError, AddressKind, DecodedAddress, PhysMemType, VirtMemType,
    make_instr_address, make_phys_address, make_reg_address, make_virt_address,
};
pub use bits::{BitVector, SramWord, mask64, sign_extend};
pub use constants::BAD_DATA_WORD;
pub use error::{ModelError, ModelResult, config_check};
pub use status::BfStatus;
