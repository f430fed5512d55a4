//! Exact-match forwarding table (destination MAC to egress port).
//!
//! Entries live in one match SRAM. Each 128-bit word holds two entries:
//!
//! ```text
//!  bit 0        48    49      53        62   64        112   113    117       126
//! +------------+-----+-------+---------+----+----------+-----+-------+---------+--+
//! | MAC (pri 4)| vld | next  | port    |    |MAC (pri3)| vld | next  | port    |  |
//! +------------+-----+-------+---------+----+----------+-----+-------+---------+--+
//! ```
//!
//! The word index is a 10-bit XOR fold of the MAC. Entries are written with
//! physical SRAM writes and read back through the column match engine, so a lookup
//! exercises the same path a packet would.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::common::constants::NXTAB_BUSES;
use crate::common::{BfStatus, PhysMemType, SramWord, make_phys_address, make_reg_address};
use crate::driver::lock_stage;
use crate::mau::registers::RegBlock;
use crate::mau::sram::{MatchFormat, SlotFormat};
use crate::mau::sram_column::ColumnLtConfig;
use crate::mau::sram_row::MauSramRowReg;
use crate::pipeline::{Phv, PhvField};
use crate::sim::Simulation;

const MAC_BITS: u32 = 48;
const PORT_BITS: u32 = 9;
const INDEX_BITS: u32 = 10;

/// Where the table lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ForwardTableConfig {
    /// Pipe.
    pub pipe: u8,
    /// Stage.
    pub stage: u8,
    /// Logical table.
    pub lt: u8,
    /// SRAM row.
    pub row: u8,
    /// SRAM column.
    pub col: u8,
    /// Next-table bus of the row.
    pub bus: u8,
    /// Next table stored with every entry.
    pub next_table: u8,
}

/// One MAC to port mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ForwardEntry {
    /// Destination MAC (48 bits).
    pub mac: u64,
    /// Egress port.
    pub port: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Placement {
    index: u32,
    slot: usize,
    port: u16,
}

/// Driver-side handle of a forwarding table.
#[derive(Debug)]
pub struct ForwardTable {
    cfg: ForwardTableConfig,
    format: MatchFormat,
    entries: BTreeMap<u64, Placement>,
}

/// Word index of a MAC.
pub const fn hash_mac(mac: u64) -> u32 {
    let mut folded = 0;
    let mut rest = mac & ((1 << MAC_BITS) - 1);
    while rest != 0 {
        folded ^= rest & ((1 << INDEX_BITS) - 1);
        rest >>= INDEX_BITS;
    }
    folded as u32
}

fn slot(lsb: u32, priority: u8) -> SlotFormat {
    SlotFormat {
        lsb,
        key_width: MAC_BITS,
        key_offset: 0,
        nxt_tab_width: 4,
        imm_width: PORT_BITS,
        priority,
    }
}

impl ForwardTable {
    /// Allocates the SRAM, column and next-table bus for the table.
    pub fn setup(sim: &Simulation, cfg: ForwardTableConfig) -> Result<Self, BfStatus> {
        if usize::from(cfg.bus) >= NXTAB_BUSES {
            return Err(BfStatus::InvalidArg);
        }
        let format = MatchFormat {
            slots: vec![slot(0, 4), slot(64, 3)],
            default_next_table: cfg.next_table,
        };
        {
            let mut mau = lock_stage(sim, cfg.pipe, cfg.stage)?;
            let rows = mau.chip().sram_rows;
            mau.configure_match_sram(
                usize::from(cfg.row),
                usize::from(cfg.col),
                cfg.lt,
                format.clone(),
                usize::from(cfg.bus),
            )
            .map_err(|e| {
                tracing::error!(%e, "forward table SRAM rejected");
                BfStatus::InvalidArg
            })?;
            mau.configure_column(
                usize::from(cfg.col),
                cfg.lt,
                Some(ColumnLtConfig::new(1 << cfg.row, rows)),
            );
        }
        let bus_reg = u32::from(cfg.row) * NXTAB_BUSES as u32 + u32::from(cfg.bus);
        sim.model_reg_write(
            make_reg_address(cfg.pipe, cfg.stage, RegBlock::NxtabBus.code(), bus_reg),
            MauSramRowReg::pack(Some(cfg.lt)),
        )?;
        tracing::info!(lt = cfg.lt, row = cfg.row, col = cfg.col, "forward table ready");
        Ok(Self {
            cfg,
            format,
            entries: BTreeMap::new(),
        })
    }

    /// Table location.
    pub const fn config(&self) -> &ForwardTableConfig {
        &self.cfg
    }

    /// Number of installed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entry is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn word_addr(&self, index: u32) -> crate::common::Address {
        make_phys_address(
            self.cfg.pipe,
            self.cfg.stage,
            PhysMemType::Sram,
            self.cfg.row,
            self.cfg.col,
            index,
        )
    }

    fn read_word(&self, sim: &Simulation, index: u32) -> Result<SramWord, BfStatus> {
        let (lo, hi) = sim.model_ind_read(self.word_addr(index))?;
        Ok(SramWord::from_words(lo, hi))
    }

    fn write_word(&self, sim: &Simulation, index: u32, word: SramWord) -> Result<(), BfStatus> {
        sim.model_ind_write(self.word_addr(index), word.lo(), word.hi())
    }

    fn install(&self, sim: &Simulation, mac: u64, at: Placement) -> Result<(), BfStatus> {
        let mut word = self.read_word(sim, at.index)?;
        self.format.slots[at.slot].encode(&mut word, mac, self.cfg.next_table, u64::from(at.port));
        self.write_word(sim, at.index, word)
    }

    /// Adds an entry.
    ///
    /// # Returns
    ///
    /// `AlreadyExists` for a duplicate MAC, `NoSysResources` when both slots of the
    /// MAC's word are taken.
    pub fn entry_add(&mut self, sim: &Simulation, mac: u64, port: u16) -> Result<(), BfStatus> {
        if mac >> MAC_BITS != 0 || u64::from(port) >> PORT_BITS != 0 {
            return Err(BfStatus::InvalidArg);
        }
        if self.entries.contains_key(&mac) {
            return Err(BfStatus::AlreadyExists);
        }
        let index = hash_mac(mac);
        let word = self.read_word(sim, index)?;
        let slot = self
            .format
            .slots
            .iter()
            .position(|s| !s.is_valid(&word))
            .ok_or(BfStatus::NoSysResources)?;
        let at = Placement { index, slot, port };
        self.install(sim, mac, at)?;
        let _ = self.entries.insert(mac, at);
        tracing::debug!(mac, port, index, slot, "forward entry added");
        Ok(())
    }

    /// Changes the port of an existing entry.
    pub fn entry_mod(&mut self, sim: &Simulation, mac: u64, port: u16) -> Result<(), BfStatus> {
        if u64::from(port) >> PORT_BITS != 0 {
            return Err(BfStatus::InvalidArg);
        }
        let at = self.entries.get_mut(&mac).ok_or(BfStatus::ObjectNotFound)?;
        at.port = port;
        let at = *at;
        self.install(sim, mac, at)
    }

    /// Removes an entry.
    pub fn entry_del(&mut self, sim: &Simulation, mac: u64) -> Result<(), BfStatus> {
        let at = self.entries.remove(&mac).ok_or(BfStatus::ObjectNotFound)?;
        let mut word = self.read_word(sim, at.index)?;
        self.format.slots[at.slot].clear(&mut word);
        self.write_word(sim, at.index, word)
    }

    /// Looks a MAC up through the match engine.
    ///
    /// # Returns
    ///
    /// The egress port, or `ObjectNotFound` on a miss.
    pub fn entry_get(&self, sim: &Simulation, mac: u64) -> Result<u16, BfStatus> {
        let hit = sim.exact_match_lookup(
            self.cfg.pipe,
            self.cfg.stage,
            self.cfg.lt,
            hash_mac(mac),
            u128::from(mac),
        )?;
        match hit {
            Some((_, Some(port))) => Ok(port as u16),
            _ => Err(BfStatus::ObjectNotFound),
        }
    }

    /// Entry with the lowest MAC.
    pub fn get_first(&self) -> Result<ForwardEntry, BfStatus> {
        self.entries
            .iter()
            .next()
            .map(|(&mac, at)| ForwardEntry { mac, port: at.port })
            .ok_or(BfStatus::ObjectNotFound)
    }

    /// Up to `n` entries following `mac` in MAC order.
    pub fn get_next_n(&self, mac: u64, n: usize) -> Vec<ForwardEntry> {
        self.entries
            .range(mac.saturating_add(1)..)
            .take(n)
            .map(|(&mac, at)| ForwardEntry { mac, port: at.port })
            .collect()
    }

    /// Forwards a parsed packet: looks up `EthDst` and sets `EgressPort`.
    pub fn lookup_phv(&self, sim: &Simulation, phv: &mut Phv) -> Result<u16, BfStatus> {
        let mac = phv.get(PhvField::EthDst).ok_or(BfStatus::InvalidArg)?;
        let port = self.entry_get(sim, mac)?;
        phv.set(PhvField::EgressPort, u64::from(port));
        Ok(port)
    }
}
