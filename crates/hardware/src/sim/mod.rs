//! Simulation context.
//!
//! Owns the pipes of stages, the cooperative scheduler that replaces timer
//! threads, and the diagnostic event log.

/// JSON-lines diagnostic event log.
pub mod event_log;

/// Timed background tasks.
pub mod scheduler;

/// Driver-facing simulation context.
pub mod simulation;

pub use scheduler::{Scheduler, Task};
pub use simulation::{FatalHook, Simulation};
