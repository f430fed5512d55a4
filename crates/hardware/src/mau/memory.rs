//! Indirect memory access.
//!
//! Routes PBUS reads and writes that target a stage:
//! 1. **Registers:** through the register file and its observers.
//! 2. **Instructions:** writes dispatch to the op handler; reads are invalid.
//! 3. **Physical:** SRAM words as `(lo, hi)`, mapram words in `data0`, TCAM entries
//!    as `(word0, word1)`.
//! 4. **Virtual:** through the logical table's mapram bindings.
//!
//! Accesses that do not resolve are bad accesses: they return the bad-data pattern
//! (or `false`) after an error log, unless the matching `allow_bad_*` flag is set.

use super::Mau;
use crate::common::{
    Address, AddressKind, BAD_DATA_WORD, ModelResult, PhysMemType, SramWord, VirtMemType,
};
use crate::mau::mapram::MapramType;
use crate::mau::op_handler::InstrEffect;
use crate::mau::resources::join_vaddr;
use crate::mau::tcam::TcamEntry;

/// Which allow-bad flag governs an access.
#[derive(Clone, Copy, Debug)]
enum AccessClass {
    Type,
    Reg,
    Phys,
    Virt,
}

impl Mau {
    fn bad_allowed(&self, class: AccessClass, write: bool) -> bool {
        let f = &self.res.flags;
        match (class, write) {
            (AccessClass::Type, _) => f.allow_bad_type,
            (AccessClass::Reg, false) => f.allow_bad_reg_read,
            (AccessClass::Reg, true) => f.allow_bad_reg_write,
            (AccessClass::Phys, false) => f.allow_bad_phys_read,
            (AccessClass::Phys, true) => f.allow_bad_phys_write,
            (AccessClass::Virt, false) => f.allow_bad_virt_read,
            (AccessClass::Virt, true) => f.allow_bad_virt_write,
        }
    }

    fn bad_read(&mut self, class: AccessClass, addr: Address) -> (u64, u64) {
        self.res.stats.bad_accesses += 1;
        if self.bad_allowed(class, false) {
            tracing::warn!(addr = addr.val(), ?class, "bad read allowed");
            (0, 0)
        } else {
            tracing::error!(addr = addr.val(), ?class, "bad read");
            (BAD_DATA_WORD, BAD_DATA_WORD)
        }
    }

    fn bad_write(&mut self, class: AccessClass, addr: Address) -> bool {
        self.res.stats.bad_accesses += 1;
        if self.bad_allowed(class, true) {
            tracing::warn!(addr = addr.val(), ?class, "bad write allowed");
            true
        } else {
            tracing::error!(addr = addr.val(), ?class, "bad write");
            false
        }
    }

    /// Reads the word at `addr`.
    ///
    /// # Arguments
    ///
    /// * `addr` - Full PBUS address of this stage.
    /// * `t` - Access time in cycles.
    ///
    /// # Returns
    ///
    /// `(data0, data1)`; the bad-data pattern in both halves when the access does
    /// not resolve.
    pub fn read(&mut self, addr: Address, t: u64) -> (u64, u64) {
        self.res.stats.mem_accesses += 1;
        let decoded = match addr.decode() {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(%e, "address decode failed");
                return self.bad_read(AccessClass::Type, addr);
            }
        };
        tracing::trace!(addr = addr.val(), t, kind = ?decoded.kind, "read");
        match decoded.kind {
            AddressKind::Register { block, index } => match self.reg_read(block, index) {
                Some(v) => (v, 0),
                None => self.bad_read(AccessClass::Reg, addr),
            },
            AddressKind::Instruction { .. } => {
                self.res.stats.bad_accesses += 1;
                tracing::error!(addr = addr.val(), "instruction addresses are write-only");
                (BAD_DATA_WORD, BAD_DATA_WORD)
            }
            AddressKind::Physical {
                mem_type,
                row,
                col,
                index,
            } => match self.phys_read(mem_type, usize::from(row), usize::from(col), index) {
                Some(data) => data,
                None => self.bad_read(AccessClass::Phys, addr),
            },
            AddressKind::Virtual { mem_type, lt, vaddr } => {
                match self.res.virt_read(mem_type, lt, vaddr) {
                    Some(word) => (word.lo(), word.hi()),
                    None => self.bad_read(AccessClass::Virt, addr),
                }
            }
        }
    }

    /// Writes `(data0, data1)` to `addr`.
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the access was bad (and not allowed) or an instruction was
    /// refused. `Err` only for fatal conditions raised by an instruction.
    pub fn write(&mut self, addr: Address, data0: u64, data1: u64, t: u64) -> ModelResult<bool> {
        self.res.stats.mem_accesses += 1;
        let decoded = match addr.decode() {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(%e, "address decode failed");
                return Ok(self.bad_write(AccessClass::Type, addr));
            }
        };
        tracing::trace!(addr = addr.val(), data0, data1, t, kind = ?decoded.kind, "write");
        let ok = match decoded.kind {
            AddressKind::Register { block, index } => {
                self.reg_write(block, index, data0) || self.bad_write(AccessClass::Reg, addr)
            }
            AddressKind::Instruction { instr } => {
                return Ok(self.instr_handle(instr, data0, data1, t)? != InstrEffect::Refused);
            }
            AddressKind::Physical {
                mem_type,
                row,
                col,
                index,
            } => {
                self.phys_write(mem_type, usize::from(row), usize::from(col), index, data0, data1)
                    || self.bad_write(AccessClass::Phys, addr)
            }
            AddressKind::Virtual { mem_type, lt, vaddr } => {
                self.virt_write(mem_type, lt, vaddr, SramWord::from_words(data0, data1))
                    || self.bad_write(AccessClass::Virt, addr)
            }
        };
        Ok(ok)
    }

    fn phys_read(&self, mem_type: PhysMemType, row: usize, col: usize, index: u32) -> Option<(u64, u64)> {
        let res = &self.res;
        match mem_type {
            PhysMemType::Sram => {
                let word = res.srams.get(row)?.get(col)?.read(index)?;
                Some((word.lo(), word.hi()))
            }
            PhysMemType::Mapram => {
                let word = res.maprams.get(row)?.get(col)?.read(index)?;
                Some((u64::from(word), 0))
            }
            PhysMemType::Tcam => {
                let entry = res.tcams.get(row)?.get(col)?.read(index)?;
                Some((entry.word0, entry.word1))
            }
        }
    }

    fn phys_write(
        &mut self,
        mem_type: PhysMemType,
        row: usize,
        col: usize,
        index: u32,
        data0: u64,
        data1: u64,
    ) -> bool {
        match mem_type {
            PhysMemType::Sram => {
                if row >= self.res.srams.len() || col >= self.res.chip.sram_cols {
                    return false;
                }
                let cfg = self.res.mapram_regs[row][col].config();
                if self.res.mapram_regs[row][col].mapram_type() == MapramType::Meter
                    && let Some(alu) = self.res.meter_alu_for(cfg.lt)
                    && let Some(pre) = self.res.srams[row][col].read(index)
                {
                    self.res.meter_alus[alu].cache_v(join_vaddr(cfg.vpn, index), pre);
                }
                self.res.srams[row][col].write(index, SramWord::from_words(data0, data1))
            }
            PhysMemType::Mapram => self
                .res
                .maprams
                .get_mut(row)
                .and_then(|r| r.get_mut(col))
                .is_some_and(|m| m.write(index, data0)),
            PhysMemType::Tcam => self
                .res
                .tcams
                .get_mut(row)
                .and_then(|r| r.get_mut(col))
                .is_some_and(|t| t.write(index, TcamEntry::new(data0, data1))),
        }
    }

    fn virt_write(&mut self, mem_type: VirtMemType, lt: u8, vaddr: u32, word: SramWord) -> bool {
        if mem_type == VirtMemType::Meter
            && let Some(alu) = self.res.meter_alu_for(lt)
            && let Some(pre) = self.res.virt_read(mem_type, lt, vaddr)
        {
            self.res.meter_alus[alu].cache_v(vaddr, pre);
        }
        self.res.virt_write(mem_type, lt, vaddr, word)
    }
}
