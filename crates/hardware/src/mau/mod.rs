//! Match-action unit (MAU) stage.
//!
//! This module defines the `Mau` structure, one pipeline stage of the switch. It
//! coordinates the following:
//! 1. **Memories:** SRAM, mapram and TCAM grids with physical and virtual access.
//! 2. **Match:** Exact-match column lookups and ternary lookups per logical table.
//! 3. **Resources:** Stats, meter, LPF/RED, stateful and idletime ALUs, updated at
//!    end-of-packet through address distribution.
//! 4. **Control:** Register writes, instruction-bus operations and table moves.

/// Address distribution queues.
pub mod addr_dist;

/// Idletime counters.
pub mod idletime;

/// Instruction-bus opcode codec.
pub mod instr;

/// LPF and RED meter datapath.
pub mod lpf_meter;

/// Map RAMs and their type reconciliation.
pub mod mapram;

/// Indirect (PBUS) read and write routing.
pub mod memory;

/// Token-bucket meter datapath.
pub mod meter;

/// Table-move register pipelines.
pub mod moveregs;

/// Table-move controller.
pub mod moveregs_ctl;

/// Instruction-bus operation handlers.
pub mod op_handler;

/// Configuration register file.
pub mod registers;

/// Stage memories and ALUs.
pub mod resources;

/// Unit SRAM.
pub mod sram;

/// Column match engine.
pub mod sram_column;

/// Per-row SRAM registers.
pub mod sram_row;

/// Stateful ALU.
pub mod stateful;

/// Stats counter words.
pub mod stats;

/// Ternary match memory.
pub mod tcam;

pub use op_handler::InstrEffect;

use std::sync::Arc;

use serde::Serialize;

use crate::common::constants::NXTAB_BUSES;
use crate::common::{ModelResult, SramWord, VirtMemType, config_check};
use crate::config::{ChipDescriptor, ModelFlags};
use crate::mau::addr_dist::{ColorWrite, DeferredKind, DeferredWrite, Eviction};
use crate::mau::idletime::MauIdletime;
use crate::mau::instr::LockKind;
use crate::mau::lpf_meter::LpfInput;
use crate::mau::mapram::MapramType;
use crate::mau::meter::{Color, MeterInput, MeterKind};
use crate::mau::moveregs::MoveregsConfig;
use crate::mau::moveregs_ctl::MauMoveregsCtl;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};
use crate::mau::resources::{MauResources, join_vaddr};
use crate::mau::sram::MatchFormat;
use crate::mau::sram_column::{ColumnHit, ColumnLtConfig};
use crate::mau::stats::StatsEntry;
use crate::mau::stateful::SaluInstr;
use crate::mau::tcam::MauTcam;
use crate::stats::ModelStats;

/// Records a stage reports to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Notification {
    /// One stats word.
    StatsDump {
        /// Logical table.
        lt: u8,
        /// Stats virtual address.
        vaddr: u32,
        /// Packet count.
        pkts: u64,
        /// Byte count.
        bytes: u64,
    },
    /// One idletime word.
    IdleDump {
        /// Logical table.
        lt: u8,
        /// Idletime word virtual address.
        vaddr: u32,
        /// Raw mapram word.
        word: u16,
    },
    /// A barrier or lock completed.
    BarrierAck {
        /// Barrier or lock kind.
        kind: LockKind,
        /// Logical table.
        lt: u8,
        /// Id from the instruction.
        id: u16,
    },
    /// A stateful ALU instruction ran.
    StatefulResult {
        /// Logical table.
        lt: u8,
        /// Register virtual address.
        vaddr: u32,
        /// ALU output.
        value: i64,
    },
}

/// One MAU stage.
#[derive(Debug)]
pub struct Mau {
    pipe: u8,
    stage: u8,
    moveregs: MauMoveregsCtl,
    res: MauResources,
    atomic_in_progress: bool,
}

impl Mau {
    /// Creates an unconfigured stage.
    ///
    /// # Arguments
    ///
    /// * `pipe` - Pipe the stage belongs to.
    /// * `stage` - Stage number within the pipe.
    /// * `chip` - Shared chip descriptor.
    /// * `flags` - Allow/relax policy.
    pub fn new(pipe: u8, stage: u8, chip: Arc<ChipDescriptor>, flags: ModelFlags) -> Self {
        Self {
            pipe,
            stage,
            moveregs: MauMoveregsCtl::new(flags.relax_moveregs_check),
            res: MauResources::new(chip, flags),
            atomic_in_progress: false,
        }
    }

    /// Pipe number.
    pub const fn pipe(&self) -> u8 {
        self.pipe
    }

    /// Stage number.
    pub const fn stage(&self) -> u8 {
        self.stage
    }

    /// Chip descriptor.
    pub fn chip(&self) -> &ChipDescriptor {
        self.res.chip()
    }

    /// Policy flags.
    pub const fn flags(&self) -> &ModelFlags {
        &self.res.flags
    }

    /// Stage memories and ALUs.
    pub const fn resources(&self) -> &MauResources {
        &self.res
    }

    /// Mutable access to the stage memories and ALUs.
    pub const fn resources_mut(&mut self) -> &mut MauResources {
        &mut self.res
    }

    /// Table-move controller.
    pub const fn moveregs(&self) -> &MauMoveregsCtl {
        &self.moveregs
    }

    /// Activity counters.
    pub const fn stats(&self) -> &ModelStats {
        &self.res.stats
    }

    /// Current meter time base.
    pub const fn meter_time(&self) -> u64 {
        self.res.meter_time
    }

    /// Returns `true` while an atomic batch holds the stage.
    pub const fn atomic_in_progress(&self) -> bool {
        self.atomic_in_progress
    }

    /// Opens or closes an atomic batch on the stage.
    pub const fn set_atomic_in_progress(&mut self, on: bool) {
        self.atomic_in_progress = on;
    }

    /// Removes and returns the queued notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.res.notifications)
    }

    /// Removes and returns the queued idle evictions.
    pub fn take_evictions(&mut self) -> Vec<Eviction> {
        self.res.addr_dist.take_evictions()
    }

    /// Reads a configuration register.
    pub fn reg_read(&mut self, block: u8, index: u32) -> Option<u64> {
        self.res.stats.reg_accesses += 1;
        let field = self.res.registers.resolve(block, index)?;
        self.res.registers.read(field)
    }

    /// Writes a configuration register and applies its side effects.
    ///
    /// # Returns
    ///
    /// `false` when the register does not exist.
    pub fn reg_write(&mut self, block: u8, index: u32, value: u64) -> bool {
        self.res.stats.reg_accesses += 1;
        let Some(field) = self.res.registers.resolve(block, index) else {
            return false;
        };
        let Some(stored) = self.res.registers.write(field, value) else {
            return false;
        };
        let events = self.dispatch_register(field, stored);
        for event in events {
            self.apply_event(event);
        }
        true
    }

    /// Writes a register by block.
    pub fn write_field(&mut self, block: RegBlock, index: u32, value: u64) -> bool {
        self.reg_write(block.code(), index, value)
    }

    fn dispatch_register(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        let idx = field.index as usize;
        let res = &mut self.res;
        match field.block {
            RegBlock::MapramConfig | RegBlock::MapramWiring => {
                let cols = res.chip.sram_cols;
                res.mapram_regs[idx / cols][idx % cols].register_written(field, value)
            }
            RegBlock::NxtabBus => res.row_regs[idx / NXTAB_BUSES].register_written(field, value),
            RegBlock::MeterAluConfig => res.meter_alus[idx].register_written(field, value),
            RegBlock::IdletimeConfig => res.idletime.register_written(field, value),
            RegBlock::TcamOwner => {
                let cols = res.chip.tcam_cols;
                res.tcams[idx / cols][idx % cols].register_written(field, value)
            }
            RegBlock::MoveregsConfig => {
                res.lt_cfg[idx].moveregs = MoveregsConfig::unpack(value);
                Vec::new()
            }
            RegBlock::MissAddress => {
                res.lt_cfg[idx].miss_addr = (value & (1 << 23) != 0).then_some((value & 0x7f_ffff) as u32);
                Vec::new()
            }
            RegBlock::Scratch => Vec::new(),
        }
    }

    fn apply_event(&mut self, event: ConfigEvent) {
        match event {
            ConfigEvent::MapramTypeChanged { row, col, old, new } => {
                tracing::debug!(
                    pipe = self.pipe,
                    stage = self.stage,
                    row,
                    col,
                    ?old,
                    ?new,
                    "mapram type changed"
                );
                let sram = &mut self.res.srams[row][col];
                let backs_data = matches!(
                    new,
                    MapramType::Stats | MapramType::Meter | MapramType::Stateful | MapramType::Selector
                );
                if backs_data && sram.match_lt().is_none() {
                    sram.configure_data();
                }
            }
        }
    }

    /// Allocates an SRAM to a match table.
    pub fn configure_match_sram(
        &mut self,
        row: usize,
        col: usize,
        lt: u8,
        format: MatchFormat,
        nxtab_bus: usize,
    ) -> ModelResult<()> {
        let Some(sram) = self.res.srams.get_mut(row).and_then(|r| r.get_mut(col)) else {
            return config_check(false, "mau", format!("no SRAM at row {row} col {col}"));
        };
        sram.configure_match(lt, format, nxtab_bus)
    }

    /// Installs the column configuration for a table.
    pub fn configure_column(&mut self, col: usize, lt: u8, cfg: Option<ColumnLtConfig>) {
        if let Some(column) = self.res.columns.get_mut(col) {
            column.configure_lt(lt, cfg);
        }
    }

    /// Installs a stateful ALU instruction.
    pub fn configure_stateful(&mut self, lt: u8, index: usize, instr: Option<SaluInstr>) -> bool {
        self.res.stateful.configure(lt, index, instr)
    }

    /// Exact-match lookup across every column.
    ///
    /// # Returns
    ///
    /// The lowest-column hit. Hits in more than one column fail unless
    /// `relax_multi_col_hit_check` is set.
    pub fn sram_lookup(&mut self, lt: u8, index: u32, key: u128) -> ModelResult<Option<ColumnHit>> {
        self.res.stats.sram_lookups += 1;
        let res = &mut self.res;
        let mut found: Option<ColumnHit> = None;
        for column in &mut res.columns {
            let Some(hit) = column.lookup(lt, index, key, &res.srams, &res.row_regs, &res.flags)? else {
                continue;
            };
            match found {
                Some(first) => config_check(
                    res.flags.relax_multi_col_hit_check,
                    "mau",
                    format!("lt {lt} hit in columns {} and {}", first.col, hit.col),
                )?,
                None => found = Some(hit),
            }
        }
        if found.is_some() {
            res.stats.sram_hits += 1;
        }
        Ok(found)
    }

    /// Immediate action data of a column hit.
    pub fn hit_imm_data(&self, hit: &ColumnHit) -> Option<u64> {
        self.res.srams.get(hit.row)?.get(hit.col)?.imm_data(hit.hit_index, hit.slot)
    }

    /// Ternary lookup across the TCAMs owned by `lt`.
    ///
    /// # Returns
    ///
    /// The match address of the highest-priority hit. A hit on an address held by
    /// the table's move pipeline commits the pending move first.
    pub fn tcam_lookup(&mut self, lt: u8, key: u64) -> Option<u32> {
        self.res.stats.tcam_lookups += 1;
        let entries = self.res.chip.tcam_entries as u32;
        let owned = self.res.tcams_of(lt);
        let addr = owned.iter().enumerate().rev().find_map(|(k, &(row, col))| {
            self.res.tcams[row][col]
                .lookup(key)
                .map(|index| k as u32 * entries + index)
        })?;
        self.res.stats.tcam_hits += 1;
        self.moveregs.maybe_commit(lt, addr, &mut self.res);
        Some(addr)
    }

    /// Applies every staged TCAM write at once: lock all, flush all, unlock all.
    pub fn flush_all_tcam_writeregs(&mut self) -> usize {
        let mut locked: Vec<&mut MauTcam> = self
            .res
            .tcams
            .iter_mut()
            .flatten()
            .filter_map(|t| t.pending_lock().then_some(t))
            .collect();
        let mut flushed = 0;
        for tcam in &mut locked {
            if tcam.flush_writereg() {
                flushed += 1;
            }
        }
        for tcam in &mut locked {
            tcam.pending_unlock();
        }
        flushed
    }

    /// Records a packet hit on `addr`: refreshes idletime and queues the direct
    /// stats and meter updates until `eop`.
    pub fn process_hit(&mut self, lt: u8, addr: u32, bytes: u64, color_in: Color, eop: u32) {
        let cfg = self.res.lt_config(lt).moveregs;
        if let Some(xf) = cfg.idle {
            let entry = xf.apply(addr);
            if let Some(value) = self.res.idle_entry(lt, entry)
                && value != 0
                && !self.res.set_idle_entry(lt, entry, 0)
            {
                tracing::warn!(lt, entry, "idle refresh does not resolve");
            }
        }
        if cfg.stats.is_some() {
            self.res.addr_dist.defer(DeferredWrite {
                lt,
                addr,
                eop,
                kind: DeferredKind::Stats { bytes },
            });
        }
        if cfg.meter.is_some() {
            self.res.addr_dist.defer(DeferredWrite {
                lt,
                addr,
                eop,
                kind: DeferredKind::Meter { bytes, color_in },
            });
        }
    }

    /// Applies the updates released by end-of-packet `eop`.
    ///
    /// # Arguments
    ///
    /// * `eop` - End-of-packet number.
    /// * `now` - Cycles since the meter time base.
    pub fn handle_eop(&mut self, eop: u32, now: u64) -> ModelResult<()> {
        for write in self.res.addr_dist.take_eop(eop) {
            let cfg = self.res.lt_config(write.lt).moveregs;
            match write.kind {
                DeferredKind::Stats { bytes } => {
                    let Some(xf) = cfg.stats else { continue };
                    let vaddr = xf.apply(write.addr);
                    let Some(word) = self.res.virt_read(VirtMemType::Stats, write.lt, vaddr) else {
                        tracing::warn!(lt = write.lt, vaddr, "stats address does not resolve");
                        continue;
                    };
                    let updated = StatsEntry::from_word(&word).increment(bytes);
                    if !self.res.virt_write(VirtMemType::Stats, write.lt, vaddr, updated.to_word()) {
                        tracing::warn!(lt = write.lt, vaddr, "stats write-back does not resolve");
                        continue;
                    }
                    self.res.stats.stats_updates += 1;
                }
                DeferredKind::Meter { bytes, color_in } => {
                    let Some(xf) = cfg.meter else { continue };
                    let color = self.run_meter(write.lt, xf.apply(write.addr), bytes, color_in, now, false)?;
                    if let Some(color) = color.filter(|c| *c != Color::Inhibit) {
                        self.res.addr_dist.queue_color(ColorWrite {
                            lt: write.lt,
                            addr: write.addr,
                            color,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the meter ALU of `lt` on `vaddr` and writes the result back.
    ///
    /// # Returns
    ///
    /// The color produced, or `None` when the table has no meter ALU or the
    /// address does not resolve.
    pub fn run_meter(
        &mut self,
        lt: u8,
        vaddr: u32,
        bytes: u64,
        color_in: Color,
        now: u64,
        sweep: bool,
    ) -> ModelResult<Option<Color>> {
        let Some(alu_idx) = self.res.meter_alu_for(lt) else {
            return Ok(None);
        };
        let Some(ram) = self.res.virt_read(VirtMemType::Meter, lt, vaddr) else {
            tracing::warn!(lt, vaddr, "meter address does not resolve");
            return Ok(None);
        };
        let present_time = self.res.meter_time;
        let alu = &mut self.res.meter_alus[alu_idx];
        let cfg = alu.config();
        let decrement = if cfg.byte_mode { bytes } else { 1 };
        let random = splitmix(vaddr, now);
        let (data_out, color) = match cfg.kind {
            MeterKind::Bucket => {
                let data_in = alu.meter.maybe_use_cache_v(vaddr, ram);
                let out = alu.meter.calculate_output(&MeterInput {
                    vaddr,
                    data_in,
                    present_time,
                    relative_time: now,
                    color_in,
                    decrement,
                    random,
                    rng_enable: cfg.fractional_bits > 0,
                    meter_sweep: sweep,
                })?;
                (out.data_out, out.color_out)
            }
            MeterKind::Lpf | MeterKind::Red => {
                let data_in = alu.lpf.maybe_use_cache_v(vaddr, ram);
                let out = alu.lpf.calculate_output(&LpfInput {
                    vaddr,
                    data_in,
                    present_time,
                    relative_time: now,
                    sample: bytes,
                    random,
                    meter_sweep: sweep,
                });
                (out.data_out, out.color_out)
            }
        };
        if !self.res.virt_write(VirtMemType::Meter, lt, vaddr, data_out) {
            tracing::warn!(lt, vaddr, "meter write-back does not resolve");
            return Ok(None);
        }
        self.res.stats.meter_updates += 1;
        if color == Color::Red {
            self.res.stats.meter_red += 1;
        }
        Ok(Some(color))
    }

    /// Credits every configured meter of every bucket-mode ALU without debiting.
    pub fn meter_sweep(&mut self, now: u64) -> ModelResult<()> {
        let tables: Vec<u8> = self
            .res
            .meter_alus
            .iter()
            .filter(|alu| alu.config().kind == MeterKind::Bucket)
            .filter_map(|alu| alu.config().lt)
            .collect();
        for lt in tables {
            for (row, col, vpn) in self.res.maprams_of(lt, MapramType::Meter) {
                for index in 0..self.res.chip.sram_entries as u32 {
                    if self.res.srams[row][col].read(index).is_none_or(|w| w == SramWord::ZERO) {
                        continue;
                    }
                    let _ = self.run_meter(lt, join_vaddr(vpn, index), 0, Color::Green, now, true)?;
                }
            }
        }
        Ok(())
    }

    /// Ages the idletime entries of `lt` (or of every table) by one sweep.
    ///
    /// Entries that become idle are queued as evictions.
    pub fn idle_sweep(&mut self, only_lt: Option<u8>) {
        let tables: Vec<u8> = match only_lt {
            Some(lt) => vec![lt],
            None => (0..self.res.chip.logical_tables as u8).collect(),
        };
        for lt in tables {
            let Some(cfg) = self.res.idletime.config(lt) else {
                continue;
            };
            let Some(per_word) = cfg.entries_per_word() else {
                continue;
            };
            for (row, col, vpn) in self.res.maprams_of(lt, MapramType::Idletime) {
                for index in 0..self.res.chip.sram_entries as u32 {
                    let Some(word) = self.res.maprams[row][col].read(index) else {
                        continue;
                    };
                    let (updated, idle) = MauIdletime::sweep_word(cfg, word);
                    let _ = self.res.maprams[row][col].write(index, u64::from(updated));
                    for sub in idle {
                        self.res.stats.idle_timeouts += 1;
                        self.res.addr_dist.queue_eviction(Eviction {
                            lt,
                            addr: join_vaddr(vpn, index) * per_word + sub,
                        });
                    }
                }
            }
        }
    }

    /// Writes every queued meter color to the color maprams.
    ///
    /// # Returns
    ///
    /// The number of colors written.
    pub fn flush_color_queue(&mut self) -> usize {
        let mut written = 0;
        for write in self.res.addr_dist.flush_colors() {
            let Some(xf) = self.res.lt_config(write.lt).moveregs.meter else {
                continue;
            };
            let Some(code) = write.color.code() else {
                continue;
            };
            let vaddr = xf.apply(write.addr);
            let (vpn, index) = resources::split_vaddr(vaddr);
            if let Some((row, col)) = self.res.find_mapram(write.lt, vpn, MapramType::Color)
                && self.res.maprams[row][col].write(index, u64::from(code))
            {
                written += 1;
            }
        }
        written
    }

    /// Returns the stage to its reset state.
    pub fn reset(&mut self) {
        let chip = Arc::clone(&self.res.chip);
        let flags = self.res.flags;
        self.res = MauResources::new(chip, flags);
        self.moveregs.reset();
        self.atomic_in_progress = false;
    }
}

/// Deterministic per-access random value for fractional credit and RED drops.
const fn splitmix(vaddr: u32, now: u64) -> u64 {
    let mut z = now.wrapping_add((vaddr as u64) << 32).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
