//! # Mocks

/// `MoveregsHost` mock and a recording fake.
pub mod moveregs_host;
