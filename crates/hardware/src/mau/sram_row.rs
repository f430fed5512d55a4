//! Per-row SRAM registers.
//!
//! Each SRAM row carries two next-table buses. A match SRAM drives its hit result
//! onto one of them, and the row register says which logical table listens on
//! each bus. A hit whose bus is not wired to the requesting table is a
//! configuration error the column engine checks before accepting it.

use crate::common::constants::NXTAB_BUSES;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};

/// Next-table bus wiring for one SRAM row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MauSramRowReg {
    row: usize,
    bus_lt: [Option<u8>; NXTAB_BUSES],
}

impl MauSramRowReg {
    /// Creates a row register with both buses unassigned.
    pub const fn new(row: usize) -> Self {
        Self {
            row,
            bus_lt: [None; NXTAB_BUSES],
        }
    }

    /// Physical row.
    pub const fn row(&self) -> usize {
        self.row
    }

    /// Logical table listening on `bus`.
    pub fn bus_lt(&self, bus: usize) -> Option<u8> {
        self.bus_lt.get(bus).copied().flatten()
    }

    /// Assigns `bus` to `lt` (or disconnects it).
    pub fn set_bus_lt(&mut self, bus: usize, lt: Option<u8>) {
        if let Some(slot) = self.bus_lt.get_mut(bus) {
            *slot = lt;
        }
    }

    /// Returns `true` when `bus` delivers results to `lt`.
    pub fn bus_serves(&self, bus: usize, lt: u8) -> bool {
        self.bus_lt(bus) == Some(lt)
    }

    /// Packs a bus assignment the way the `NxtabBus` register stores it.
    pub const fn pack(lt: Option<u8>) -> u64 {
        match lt {
            Some(lt) => (1 << 4) | (lt as u64 & 0xf),
            None => 0,
        }
    }

    /// Clears both buses.
    pub fn reset(&mut self) {
        self.bus_lt = [None; NXTAB_BUSES];
    }
}

impl RegisterObserver for MauSramRowReg {
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        if field.block == RegBlock::NxtabBus {
            let bus = field.index as usize % NXTAB_BUSES;
            let lt = (value & (1 << 4) != 0).then_some((value & 0xf) as u8);
            self.set_bus_lt(bus, lt);
        }
        Vec::new()
    }
}
