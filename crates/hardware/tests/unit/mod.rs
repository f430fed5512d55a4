//! # Unit Components
//!
//! This module serves as the central hub for the unit tests of the model. It
//! organizes them the way the crate is organized: shared types, configuration,
//! the match-action stage, the simulation context, the packet interfaces and the
//! driver tables.

/// Unit tests for the shared types.
///
/// This module includes tests for PBUS address encoding, bit vectors, status
/// codes and the error policy helpers.
pub mod common;




/// Unit tests for the packet header vector, parser and deparser.
pub mod pipeline;
