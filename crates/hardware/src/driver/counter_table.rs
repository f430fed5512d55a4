//! Direct-addressed counter table.
//!
//! Counters live in one SRAM bound to the table through a stats mapram. Writes go
//! through virtual stats addresses; reads come from a shadow copy that
//! `counter_table_sync` refreshes with a dump-stats-table instruction.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::common::{BfStatus, VirtMemType, make_reg_address, make_virt_address};
use crate::driver::lock_stage;
use crate::mau::instr::Instr;
use crate::mau::mapram::{MapramConfig, MapramType};
use crate::mau::registers::RegBlock;
use crate::mau::resources::{join_vaddr, split_vaddr};
use crate::mau::stats::StatsEntry;
use crate::mau::Notification;
use crate::sim::Simulation;

/// Where the table lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CounterTableConfig {
    /// Pipe.
    pub pipe: u8,
    /// Stage.
    pub stage: u8,
    /// Logical table.
    pub lt: u8,
    /// Row of the SRAM and mapram.
    pub row: u8,
    /// Column of the SRAM and mapram.
    pub col: u8,
    /// VPN the mapram serves.
    pub vpn: u8,
}

/// Driver-side handle of a counter table.
#[derive(Debug)]
pub struct CounterTable {
    cfg: CounterTableConfig,
    entries: usize,
    shadow: BTreeMap<u32, StatsEntry>,
}

impl CounterTable {
    /// Binds the mapram at `(row, col)` to the table as stats memory.
    pub fn setup(sim: &Simulation, cfg: CounterTableConfig) -> Result<Self, BfStatus> {
        let (cols, entries) = {
            let mau = lock_stage(sim, cfg.pipe, cfg.stage)?;
            (mau.chip().sram_cols, mau.chip().sram_entries)
        };
        let mapram = MapramConfig {
            self_type: MapramType::Stats,
            vpn: cfg.vpn,
            lt: cfg.lt,
            enable: true,
        };
        let index = u32::from(cfg.row) * cols as u32 + u32::from(cfg.col);
        sim.model_reg_write(
            make_reg_address(cfg.pipe, cfg.stage, RegBlock::MapramConfig.code(), index),
            mapram.pack(),
        )?;
        Ok(Self {
            cfg,
            entries,
            shadow: BTreeMap::new(),
        })
    }

    /// Number of counters.
    pub const fn capacity(&self) -> usize {
        self.entries
    }

    fn check_index(&self, index: u32) -> Result<(), BfStatus> {
        if (index as usize) < self.entries {
            Ok(())
        } else {
            Err(BfStatus::InvalidArg)
        }
    }

    /// Writes counter `index` in hardware.
    pub fn entry_add(&mut self, sim: &Simulation, index: u32, value: StatsEntry) -> Result<(), BfStatus> {
        self.check_index(index)?;
        let word = value.to_word();
        sim.model_ind_write(
            make_virt_address(
                self.cfg.pipe,
                self.cfg.stage,
                VirtMemType::Stats,
                self.cfg.lt,
                join_vaddr(self.cfg.vpn, index),
            ),
            word.lo(),
            word.hi(),
        )
    }

    /// Dumps every counter of the table and refreshes the shadow.
    ///
    /// Drains the stage notification log; records of other tables are dropped.
    ///
    /// # Returns
    ///
    /// The number of counters refreshed.
    pub fn counter_table_sync(&mut self, sim: &Simulation) -> Result<usize, BfStatus> {
        let instr = Instr::DumpStatsTable {
            lt: self.cfg.lt,
            clear: false,
        };
        let _ = sim.instr_handle(self.cfg.pipe, self.cfg.stage, instr.encode(), 0, 0)?;
        let mut refreshed = 0;
        for (pipe, stage, record) in sim.drain_notifications() {
            let Notification::StatsDump { lt, vaddr, pkts, bytes } = record else {
                continue;
            };
            if (pipe, stage, lt) != (self.cfg.pipe, self.cfg.stage, self.cfg.lt) {
                continue;
            }
            let (vpn, index) = split_vaddr(vaddr);
            if vpn == self.cfg.vpn {
                let _ = self.shadow.insert(index, StatsEntry::new(pkts, bytes));
                refreshed += 1;
            }
        }
        tracing::debug!(lt = self.cfg.lt, refreshed, "counter table synced");
        Ok(refreshed)
    }

    /// Counter `index` as of the last sync.
    pub fn entry_get(&self, index: u32) -> Result<StatsEntry, BfStatus> {
        self.check_index(index)?;
        self.shadow.get(&index).copied().ok_or(BfStatus::ObjectNotFound)
    }
}
