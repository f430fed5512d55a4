//! Memories and ALUs of one stage.
//!
//! `MauResources` owns everything a stage stores: the SRAM, mapram and TCAM
//! grids, the meter, stateful and idletime ALUs, and the address distribution
//! queues. It is kept apart from the move controller so the controller can
//! borrow it mutably as its `MoveregsHost`.
//!
//! Virtual addresses resolve through the maprams: a `(table, VPN, type)` triple
//! selects the one mapram configured for it, and the SRAM beside that mapram (or
//! the mapram itself, for idletime and color) holds the word.

use std::sync::Arc;

use crate::common::constants::{LOGICAL_TABLES, RAM_INDEX_BITS, VPN_WIDTH};
use crate::common::{SramWord, VirtMemType, mask64};
use crate::config::{ChipDescriptor, ModelFlags};
use crate::mau::Notification;
use crate::mau::addr_dist::MauAddrDist;
use crate::mau::idletime::MauIdletime;
use crate::mau::mapram::{MapramType, MauMapram, MauMapramReg};
use crate::mau::meter::MauMeterAlu;
use crate::mau::moveregs::{MoveResource, MoveregsConfig};
use crate::mau::moveregs_ctl::MoveregsHost;
use crate::mau::registers::RegisterFile;
use crate::mau::sram::MauSram;
use crate::mau::sram_column::MauSramColumn;
use crate::mau::sram_row::MauSramRowReg;
use crate::mau::stateful::MauStateful;
use crate::mau::tcam::MauTcam;
use crate::stats::ModelStats;

/// Per-table configuration that is not owned by any single memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LtConfig {
    /// Match-address to resource-address transforms.
    pub moveregs: MoveregsConfig,
    /// Address the table reports on a miss.
    pub miss_addr: Option<u32>,
}

/// Where a virtual address lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtTarget {
    /// A word of the SRAM at `(row, col)`.
    Sram {
        /// Row.
        row: usize,
        /// Column.
        col: usize,
        /// Word index.
        index: u32,
    },
    /// A word of the mapram at `(row, col)`.
    Mapram {
        /// Row.
        row: usize,
        /// Column.
        col: usize,
        /// Word index.
        index: u32,
    },
}

/// Splits a virtual address into `(vpn, index)`.
pub const fn split_vaddr(vaddr: u32) -> (u8, u32) {
    (
        ((vaddr >> RAM_INDEX_BITS) as u64 & mask64(VPN_WIDTH)) as u8,
        (vaddr as u64 & mask64(RAM_INDEX_BITS)) as u32,
    )
}

/// Joins a VPN and a word index into a virtual address.
pub const fn join_vaddr(vpn: u8, index: u32) -> u32 {
    ((vpn as u32) << RAM_INDEX_BITS) | (index & mask64(RAM_INDEX_BITS) as u32)
}

/// Memories, ALUs and queues of one stage.
#[derive(Debug)]
pub struct MauResources {
    pub(crate) chip: Arc<ChipDescriptor>,
    pub(crate) flags: ModelFlags,
    pub(crate) srams: Vec<Vec<MauSram>>,
    pub(crate) row_regs: Vec<MauSramRowReg>,
    pub(crate) columns: Vec<MauSramColumn>,
    pub(crate) maprams: Vec<Vec<MauMapram>>,
    pub(crate) mapram_regs: Vec<Vec<MauMapramReg>>,
    pub(crate) tcams: Vec<Vec<MauTcam>>,
    pub(crate) meter_alus: Vec<MauMeterAlu>,
    pub(crate) idletime: MauIdletime,
    pub(crate) stateful: MauStateful,
    pub(crate) addr_dist: MauAddrDist,
    pub(crate) lt_cfg: [LtConfig; LOGICAL_TABLES],
    pub(crate) registers: RegisterFile,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) stats: ModelStats,
    pub(crate) meter_time: u64,
}

impl MauResources {
    /// Builds the memories for one stage of `chip`.
    pub fn new(chip: Arc<ChipDescriptor>, flags: ModelFlags) -> Self {
        let (rows, cols, entries) = (chip.sram_rows, chip.sram_cols, chip.sram_entries);
        let coupled = flags.meter_coupled(&chip);
        Self {
            srams: (0..rows)
                .map(|r| (0..cols).map(|c| MauSram::new(r, c, entries)).collect())
                .collect(),
            row_regs: (0..rows).map(MauSramRowReg::new).collect(),
            columns: (0..cols).map(|c| MauSramColumn::new(c, chip.logical_tables)).collect(),
            maprams: (0..rows)
                .map(|r| (0..cols).map(|c| MauMapram::new(r, c, entries)).collect())
                .collect(),
            mapram_regs: (0..rows)
                .map(|r| (0..cols).map(|c| MauMapramReg::new(r, c)).collect())
                .collect(),
            tcams: (0..chip.tcam_rows)
                .map(|r| (0..chip.tcam_cols).map(|c| MauTcam::new(r, c, chip.tcam_entries)).collect())
                .collect(),
            meter_alus: (0..chip.meter_alus)
                .map(|i| MauMeterAlu::new(i, chip.meter_level_width, chip.meter_timestamp_width, coupled))
                .collect(),
            idletime: MauIdletime::new(),
            stateful: MauStateful::new(),
            addr_dist: MauAddrDist::new(),
            lt_cfg: [LtConfig::default(); LOGICAL_TABLES],
            registers: RegisterFile::new(&chip),
            notifications: Vec::new(),
            stats: ModelStats::default(),
            meter_time: 0,
            flags,
            chip,
        }
    }

    /// Chip descriptor shared by the stage.
    pub fn chip(&self) -> &ChipDescriptor {
        &self.chip
    }

    /// Table configuration of `lt`.
    pub fn lt_config(&self, lt: u8) -> LtConfig {
        self.lt_cfg.get(usize::from(lt)).copied().unwrap_or_default()
    }

    /// Deferred writes, color queue and in-flight move addresses.
    pub const fn addr_dist(&self) -> &MauAddrDist {
        &self.addr_dist
    }

    /// Finds the mapram serving `(lt, vpn)` as `ty`.
    pub fn find_mapram(&self, lt: u8, vpn: u8, ty: MapramType) -> Option<(usize, usize)> {
        self.mapram_regs.iter().enumerate().find_map(|(row, regs)| {
            regs.iter()
                .position(|reg| reg.serves(lt, vpn, ty))
                .map(|col| (row, col))
        })
    }

    /// Every mapram classified as `ty` for `lt`, with its VPN.
    pub fn maprams_of(&self, lt: u8, ty: MapramType) -> Vec<(usize, usize, u8)> {
        let mut found = Vec::new();
        for (row, regs) in self.mapram_regs.iter().enumerate() {
            for (col, reg) in regs.iter().enumerate() {
                let cfg = reg.config();
                if cfg.enable && cfg.lt == lt && reg.mapram_type() == ty {
                    found.push((row, col, cfg.vpn));
                }
            }
        }
        found
    }

    /// Meter ALU bound to `lt`.
    pub fn meter_alu_for(&self, lt: u8) -> Option<usize> {
        self.meter_alus.iter().position(|alu| alu.config().lt == Some(lt))
    }

    /// Resolves a virtual address.
    pub fn virt_target(&self, mem_type: VirtMemType, lt: u8, vaddr: u32) -> Option<VirtTarget> {
        let (vpn, index) = split_vaddr(vaddr);
        if index as usize >= self.chip.sram_entries {
            return None;
        }
        let sram = |(row, col)| VirtTarget::Sram { row, col, index };
        match mem_type {
            VirtMemType::Stats => self.find_mapram(lt, vpn, MapramType::Stats).map(sram),
            VirtMemType::Meter => self.find_mapram(lt, vpn, MapramType::Meter).map(sram),
            VirtMemType::Selector => self
                .find_mapram(lt, vpn, MapramType::Selector)
                .or_else(|| self.find_mapram(lt, vpn, MapramType::Stateful))
                .map(sram),
            VirtMemType::Idletime => self
                .find_mapram(lt, vpn, MapramType::Idletime)
                .map(|(row, col)| VirtTarget::Mapram { row, col, index }),
        }
    }

    /// Reads the word behind a resolved virtual address (mapram words in the low bits).
    pub fn target_read(&self, target: VirtTarget) -> Option<SramWord> {
        match target {
            VirtTarget::Sram { row, col, index } => self.srams.get(row)?.get(col)?.read(index),
            VirtTarget::Mapram { row, col, index } => self
                .maprams
                .get(row)?
                .get(col)?
                .read(index)
                .map(|w| SramWord::new(u128::from(w))),
        }
    }

    /// Writes the word behind a resolved virtual address.
    pub fn target_write(&mut self, target: VirtTarget, word: SramWord) -> bool {
        match target {
            VirtTarget::Sram { row, col, index } => self
                .srams
                .get_mut(row)
                .and_then(|r| r.get_mut(col))
                .is_some_and(|s| s.write(index, word)),
            VirtTarget::Mapram { row, col, index } => self
                .maprams
                .get_mut(row)
                .and_then(|r| r.get_mut(col))
                .is_some_and(|m| m.write(index, word.lo())),
        }
    }

    /// Reads a virtual word.
    pub fn virt_read(&self, mem_type: VirtMemType, lt: u8, vaddr: u32) -> Option<SramWord> {
        self.target_read(self.virt_target(mem_type, lt, vaddr)?)
    }

    /// Writes a virtual word; returns `false` when the address does not resolve.
    pub fn virt_write(&mut self, mem_type: VirtMemType, lt: u8, vaddr: u32, word: SramWord) -> bool {
        match self.virt_target(mem_type, lt, vaddr) {
            Some(target) => self.target_write(target, word),
            None => false,
        }
    }

    /// Reads one idletime entry by entry address.
    pub fn idle_entry(&self, lt: u8, entry: u32) -> Option<u16> {
        let cfg = self.idletime.config(lt)?;
        let (word_vaddr, sub) = self.idletime.locate(lt, entry)?;
        let word = self.virt_read(VirtMemType::Idletime, lt, word_vaddr)?;
        Some(MauIdletime::get_entry(cfg, word.lo() as u16, sub))
    }

    /// Writes one idletime entry by entry address.
    pub fn set_idle_entry(&mut self, lt: u8, entry: u32, value: u16) -> bool {
        let (Some(cfg), Some((word_vaddr, sub))) = (self.idletime.config(lt), self.idletime.locate(lt, entry)) else {
            return false;
        };
        let Some(word) = self.virt_read(VirtMemType::Idletime, lt, word_vaddr) else {
            return false;
        };
        let updated = MauIdletime::set_entry(cfg, word.lo() as u16, sub, value);
        self.virt_write(VirtMemType::Idletime, lt, word_vaddr, SramWord::new(u128::from(updated)))
    }

    /// TCAMs owned by `lt`, in priority order (lowest first).
    pub fn tcams_of(&self, lt: u8) -> Vec<(usize, usize)> {
        let mut owned = Vec::new();
        for (row, tcams) in self.tcams.iter().enumerate() {
            for (col, tcam) in tcams.iter().enumerate() {
                if tcam.owner_lt() == Some(lt) {
                    owned.push((row, col));
                }
            }
        }
        owned
    }

    /// Queues a notification for the driver.
    pub fn notify(&mut self, notification: Notification) {
        self.stats.notifications += 1;
        self.notifications.push(notification);
    }

    fn resource_mem_type(res: MoveResource) -> VirtMemType {
        match res {
            MoveResource::Stats => VirtMemType::Stats,
            MoveResource::Meter => VirtMemType::Meter,
            MoveResource::Idletime => VirtMemType::Idletime,
        }
    }
}

impl MoveregsHost for MauResources {
    fn teop_busy(&self, lt: u8) -> bool {
        self.addr_dist.has_pending(lt)
    }

    fn is_miss_address(&self, lt: u8, addr: u32) -> bool {
        self.lt_config(lt).miss_addr == Some(addr)
    }

    fn moveregs_config(&self, lt: u8) -> MoveregsConfig {
        self.lt_config(lt).moveregs
    }

    fn set_inhibit(&mut self, lt: u8, addr: u32, inhibit: bool) {
        let entries = self.chip.tcam_entries as u32;
        let owned = self.tcams_of(lt);
        if !owned.is_empty() && entries > 0 {
            if let Some(&(row, col)) = owned.get((addr / entries) as usize) {
                self.tcams[row][col].set_inhibit(addr % entries, inhibit);
            }
            return;
        }
        let index = addr % self.chip.sram_entries.max(1) as u32;
        for sram in self.srams.iter_mut().flatten() {
            if sram.match_lt() == Some(lt) {
                sram.set_inhibit(index, inhibit);
            }
        }
    }

    fn copy_resource(&mut self, lt: u8, res: MoveResource, from: u32, to: u32) {
        let copied = if res == MoveResource::Idletime {
            self.idle_entry(lt, from)
                .is_some_and(|value| self.set_idle_entry(lt, to, value))
        } else {
            let mem_type = Self::resource_mem_type(res);
            self.virt_read(mem_type, lt, from)
                .is_some_and(|word| self.virt_write(mem_type, lt, to, word))
        };
        if copied {
            tracing::trace!(lt, ?res, from, to, "resource moved");
        } else {
            tracing::warn!(lt, ?res, from, to, "resource move did not resolve");
        }
    }

    fn zero_resource(&mut self, lt: u8, res: MoveResource, addr: u32) {
        let zeroed = if res == MoveResource::Idletime {
            self.set_idle_entry(lt, addr, 0)
        } else {
            self.virt_write(Self::resource_mem_type(res), lt, addr, SramWord::ZERO)
        };
        if !zeroed {
            tracing::warn!(lt, ?res, addr, "resource init did not resolve");
        }
    }

    fn update_addresses(&mut self, lt: u8, d_addr: Option<u32>, old_d_addr: Option<u32>) {
        self.addr_dist.update_addresses(lt, d_addr, old_d_addr);
        let meter = self.lt_config(lt).moveregs.meter;
        if let (Some(xf), Some(alu)) = (meter, self.meter_alu_for(lt)) {
            self.meter_alus[alu].update_addresses(d_addr.map(|a| xf.apply(a)), old_d_addr.map(|a| xf.apply(a)));
        }
    }
}
