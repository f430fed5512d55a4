//! Register-accurate model of a programmable match-action switch pipeline.
//!
//! This crate models the match-action units (MAUs) of an RMT switch ASIC with the
//! following:
//! 1. **Common:** Bit vectors, the PBUS address format, errors and status codes.
//! 2. **MAU:** Memories, match engines, stats/meter/idletime/stateful ALUs, table
//!    moves and the instruction bus of one stage.
//! 3. **Pipeline:** PHV, parser and deparser interfaces.
//! 4. **Simulation:** Pipes of stages behind the driver-facing bus entry points,
//!    a cooperative scheduler and a diagnostic event log.
//! 5. **Driver:** Forwarding and counter tables driven through the bus.

/// Common types and constants (bit vectors, addresses, errors, status codes).
pub mod common;
/// Model configuration (chip descriptor, policy flags, sweeps, logging).
pub mod config;
/// Driver-level forwarding and counter tables.
pub mod driver;
/// Match-action stage (memories, match, ALUs, moves, instructions).
pub mod mau;
/// Packet header vector, parser and deparser interfaces.
pub mod pipeline;
/// Simulation context, scheduler and event log.
pub mod sim;
/// Model activity statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// One match-action stage; construct with `Mau::new`.
pub use crate::mau::Mau;
/// The whole modelled chip; construct with `Simulation::new`.
pub use crate::sim::Simulation;
