//! Instruction-bus operation handling.
//!
//! Decodes an opcode word with `Instr::decode` and runs it against the stage. The
//! caller learns the outcome through `InstrEffect`; only an open atomic batch or a
//! strict consistency check produces an `Err`.

use super::{Mau, Notification};
use crate::common::{ModelError, ModelResult, SramWord, VirtMemType};
use crate::mau::instr::Instr;
use crate::mau::mapram::MapramType;
use crate::mau::resources::join_vaddr;
use crate::mau::tcam::TcamEntry;

/// Outcome of one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrEffect {
    /// The instruction ran.
    Done,
    /// The instruction is accepted but has no effect on this stage.
    Ignored,
    /// The instruction was rejected (bad word, busy table or bad operands).
    Refused,
    /// The meter time went backwards: every stage of the pipe must flush its
    /// queued meter colors.
    FlushPipeColors,
}

impl Mau {
    /// Handles one instruction-bus write.
    ///
    /// # Arguments
    ///
    /// * `instr` - 28-bit opcode word.
    /// * `data0` - First data word (address or operand).
    /// * `data1` - Second data word.
    /// * `t` - Access time in cycles.
    pub fn instr_handle(&mut self, instr: u32, data0: u64, data1: u64, t: u64) -> ModelResult<InstrEffect> {
        let decoded = match Instr::decode(instr) {
            Ok(i) => i,
            Err(e) => return Ok(self.bad_instr(instr, &e.to_string())),
        };
        if self.atomic_in_progress {
            return Err(ModelError::AtomicInProgress { op: decoded.name() });
        }
        self.res.stats.instrs += 1;

        #[cfg(feature = "always-trace")]
        tracing::trace!(
            pipe = self.pipe,
            stage = self.stage,
            instr = decoded.name(),
            data0,
            data1,
            t,
            "instruction"
        );
        #[cfg(not(feature = "always-trace"))]
        let _ = t;

        let effect = match decoded {
            Instr::Nop => InstrEffect::Done,
            Instr::PipeRing => InstrEffect::Ignored,
            Instr::BarrierLock { kind, lt, id } => {
                self.res.notify(Notification::BarrierAck { kind, lt, id });
                InstrEffect::Done
            }
            Instr::PushMove { lt } => {
                let accepted = self.moveregs.push_table_move_addr(lt, data0 as u32, &mut self.res)?;
                self.move_effect(accepted)
            }
            Instr::PopMove {
                lt,
                stats_init,
                idle_init,
            } => {
                let accepted = self
                    .moveregs
                    .pop_table_move_addr(lt, stats_init, idle_init, &mut self.res)?;
                self.move_effect(accepted)
            }
            Instr::Init { set_meter_time } => self.init(set_meter_time, data0),
            Instr::DumpStatsWord { lt, clear } => {
                if self.dump_stats_word(lt, data0 as u32, clear) {
                    InstrEffect::Done
                } else {
                    tracing::warn!(lt, vaddr = data0, "stats dump address does not resolve");
                    InstrEffect::Refused
                }
            }
            Instr::DumpIdleWord { lt, clear } => {
                if self.dump_idle_word(lt, data0 as u32, clear) {
                    InstrEffect::Done
                } else {
                    tracing::warn!(lt, vaddr = data0, "idle dump address does not resolve");
                    InstrEffect::Refused
                }
            }
            Instr::DumpStatsTable { lt, clear } => {
                for vaddr in self.table_vaddrs(lt, MapramType::Stats) {
                    let _ = self.dump_stats_word(lt, vaddr, clear);
                }
                InstrEffect::Done
            }
            Instr::DumpIdleTable { lt, clear } => {
                for vaddr in self.table_vaddrs(lt, MapramType::Idletime) {
                    let _ = self.dump_idle_word(lt, vaddr, clear);
                }
                InstrEffect::Done
            }
            Instr::SetTcamWritereg { row, col, index } => {
                let staged = self
                    .res
                    .tcams
                    .get_mut(usize::from(row))
                    .and_then(|r| r.get_mut(usize::from(col)))
                    .is_some_and(|tcam| tcam.set_writereg(index, TcamEntry::new(data0, data1)));
                if staged {
                    InstrEffect::Done
                } else {
                    self.bad_instr(instr, "TCAM writereg target out of range")
                }
            }
            Instr::TcamCopyWord {
                row,
                col,
                n,
                top_to_bottom,
            } => {
                let src = (data0 & 0xffff) as u32;
                let dst = ((data0 >> 16) & 0xffff) as u32;
                let copied = self
                    .res
                    .tcams
                    .get_mut(usize::from(row))
                    .and_then(|r| r.get_mut(usize::from(col)))
                    .is_some_and(|tcam| tcam.copy_word(src, dst, n, top_to_bottom));
                if copied {
                    InstrEffect::Done
                } else {
                    self.bad_instr(instr, "TCAM copy range out of bounds")
                }
            }
            Instr::RunStateful { lt, instr: index } => self.run_stateful(lt, index, data0 as u32, data1 as i64),
            Instr::ChipExtension { payload } => {
                if self.res.chip.features.idle_sweep_instr {
                    let lt = (payload & 0x10 != 0).then_some((payload & 0xf) as u8);
                    self.idle_sweep(lt);
                    InstrEffect::Done
                } else {
                    self.bad_instr(instr, "chip extension not supported")
                }
            }
        };
        Ok(effect)
    }

    fn bad_instr(&mut self, instr: u32, detail: &str) -> InstrEffect {
        self.res.stats.bad_accesses += 1;
        if self.res.flags.allow_bad_instr {
            tracing::warn!(instr, detail, "bad instruction ignored");
            InstrEffect::Ignored
        } else {
            tracing::error!(instr, detail, "bad instruction");
            InstrEffect::Refused
        }
    }

    const fn move_effect(&mut self, accepted: bool) -> InstrEffect {
        if accepted {
            self.res.stats.moves += 1;
            InstrEffect::Done
        } else {
            InstrEffect::Refused
        }
    }

    fn init(&mut self, set_meter_time: bool, time: u64) -> InstrEffect {
        if !set_meter_time {
            return InstrEffect::Done;
        }
        let previous = self.res.meter_time;
        self.res.meter_time = time;
        if time < previous {
            tracing::info!(previous, time, "meter time moved backwards; flushing colors");
            InstrEffect::FlushPipeColors
        } else {
            InstrEffect::Done
        }
    }

    fn table_vaddrs(&self, lt: u8, ty: MapramType) -> Vec<u32> {
        let entries = self.res.chip.sram_entries as u32;
        self.res
            .maprams_of(lt, ty)
            .into_iter()
            .flat_map(|(_, _, vpn)| (0..entries).map(move |index| join_vaddr(vpn, index)))
            .collect()
    }

    fn dump_stats_word(&mut self, lt: u8, vaddr: u32, clear: bool) -> bool {
        let Some(word) = self.res.virt_read(VirtMemType::Stats, lt, vaddr) else {
            return false;
        };
        self.res.notify(Notification::StatsDump {
            lt,
            vaddr,
            pkts: word.lo(),
            bytes: word.hi(),
        });
        if clear {
            if !self.res.virt_write(VirtMemType::Stats, lt, vaddr, SramWord::ZERO) {
                tracing::warn!(lt, vaddr, "dump clear does not resolve");
            }
        }
        true
    }

    fn dump_idle_word(&mut self, lt: u8, vaddr: u32, clear: bool) -> bool {
        let Some(word) = self.res.virt_read(VirtMemType::Idletime, lt, vaddr) else {
            return false;
        };
        self.res.notify(Notification::IdleDump {
            lt,
            vaddr,
            word: word.lo() as u16,
        });
        if clear {
            if !self.res.virt_write(VirtMemType::Idletime, lt, vaddr, SramWord::ZERO) {
                tracing::warn!(lt, vaddr, "dump clear does not resolve");
            }
        }
        true
    }

    fn run_stateful(&mut self, lt: u8, index: u8, vaddr: u32, operand: i64) -> InstrEffect {
        let Some(word) = self.res.virt_read(VirtMemType::Selector, lt, vaddr) else {
            tracing::warn!(lt, vaddr, "stateful address does not resolve");
            return InstrEffect::Refused;
        };
        let Some((updated, value)) = self.res.stateful.run(lt, usize::from(index), word, operand) else {
            tracing::warn!(lt, index, "stateful instruction not configured");
            return InstrEffect::Refused;
        };
        if !self.res.virt_write(VirtMemType::Selector, lt, vaddr, updated) {
            tracing::warn!(lt, vaddr, "stateful write-back does not resolve");
            return InstrEffect::Refused;
        }
        self.res.notify(Notification::StatefulResult { lt, vaddr, value });
        InstrEffect::Done
    }
}
