//! Driver-level tables built on the simulation's bus entry points.
//!
//! Every call returns `BfStatus` codes; no model error crosses this layer.

/// Direct-addressed counter table.
pub mod counter_table;

/// Exact-match forwarding table.
pub mod forward_table;

use std::sync::MutexGuard;

pub use counter_table::{CounterTable, CounterTableConfig};
pub use forward_table::{ForwardEntry, ForwardTable, ForwardTableConfig, hash_mac};

pub use crate::common::BfStatus;
use crate::mau::Mau;
use crate::sim::Simulation;

/// Locks a stage for table setup, refusing a faulted simulation.
fn lock_stage(sim: &Simulation, pipe: u8, stage: u8) -> Result<MutexGuard<'_, Mau>, BfStatus> {
    if sim.is_faulted() {
        return Err(BfStatus::NotReady);
    }
    sim.lock_resources(pipe, stage).ok_or(BfStatus::InvalidArg)
}
