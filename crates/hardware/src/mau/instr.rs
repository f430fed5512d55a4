//! Instruction-bus opcode words.
//!
//! Instruction addresses carry a 28-bit opcode word. Bits `[27:26]` select the
//! class:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | `00` | Control: opcode in `[25:22]` |
//! | `01` | TCAM: `[25]` picks writereg setup or word copy |
//! | `10` | Stateful ALU: table `[25:22]`, instruction `[21:19]` |
//! | `11` | Chip-specific extension |
//!
//! Control opcodes:
//!
//! | Opcode | Instruction | Fields |
//! |--------|-------------|--------|
//! | `0` | nop | |
//! | `1` | barrier / lock | kind `[21:20]`, table `[19:16]`, id `[15:0]` |
//! | `2` | push table-move address | table `[19:16]`, address in data0 |
//! | `3` | pop table-move address | table `[19:16]`, stats init `[15]`, idle init `[14]` |
//! | `4` | initialize | set meter time `[21]`, time in data0 |
//! | `5`..`8` | dump stats/idle word/table | table `[19:16]`, clear `[15]`, vaddr in data0 |
//! | `F` | pipe ring (ignored) | |

use serde::Serialize;
use thiserror::Error;

use crate::common::constants::INSTR_WIDTH;
use crate::common::mask64;

/// Kind of a barrier/lock instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LockKind {
    /// Ordering barrier.
    Barrier,
    /// Lock the table's stats.
    LockStats,
    /// Lock the table's idletime.
    LockIdle,
    /// Release a lock.
    Unlock,
}

impl LockKind {
    const fn code(self) -> u32 {
        match self {
            Self::Barrier => 0,
            Self::LockStats => 1,
            Self::LockIdle => 2,
            Self::Unlock => 3,
        }
    }

    const fn from_code(code: u32) -> Self {
        match code & 3 {
            0 => Self::Barrier,
            1 => Self::LockStats,
            2 => Self::LockIdle,
            _ => Self::Unlock,
        }
    }
}

/// A decoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Instr {
    /// Does nothing.
    Nop,
    /// Barrier or lock acknowledged through a notification.
    BarrierLock {
        /// Barrier or lock kind.
        kind: LockKind,
        /// Logical table.
        lt: u8,
        /// Driver-chosen id echoed back.
        id: u16,
    },
    /// Push a table-move address (address in data0).
    PushMove {
        /// Logical table.
        lt: u8,
    },
    /// Pop the table-move pipeline.
    PopMove {
        /// Logical table.
        lt: u8,
        /// Zero stats of the vacated slot.
        stats_init: bool,
        /// Zero idletime of the vacated slot.
        idle_init: bool,
    },
    /// Stage initialization; optionally sets the meter time from data0.
    Init {
        /// Load the meter time base.
        set_meter_time: bool,
    },
    /// Dump one stats word (vaddr in data0).
    DumpStatsWord {
        /// Logical table.
        lt: u8,
        /// Zero the word after dumping.
        clear: bool,
    },
    /// Dump one idletime word (vaddr in data0).
    DumpIdleWord {
        /// Logical table.
        lt: u8,
        /// Reset the word after dumping.
        clear: bool,
    },
    /// Dump every stats word of a table.
    DumpStatsTable {
        /// Logical table.
        lt: u8,
        /// Zero the words after dumping.
        clear: bool,
    },
    /// Dump every idletime word of a table.
    DumpIdleTable {
        /// Logical table.
        lt: u8,
        /// Reset the words after dumping.
        clear: bool,
    },
    /// Pipe ring traffic; ignored by the stage.
    PipeRing,
    /// Stage a TCAM write (word0 in data0, word1 in data1).
    SetTcamWritereg {
        /// TCAM row.
        row: u8,
        /// TCAM column.
        col: u8,
        /// Entry index.
        index: u32,
    },
    /// Copy TCAM entries (data0 = `src | dst << 16`).
    TcamCopyWord {
        /// TCAM row.
        row: u8,
        /// TCAM column.
        col: u8,
        /// Number of entries.
        n: u32,
        /// Copy from the highest index down.
        top_to_bottom: bool,
    },
    /// Run a stateful ALU instruction (vaddr in data0, operand in data1).
    RunStateful {
        /// Logical table.
        lt: u8,
        /// Instruction index.
        instr: u8,
    },
    /// Chip-specific extension space.
    ChipExtension {
        /// Bits `[25:0]`.
        payload: u32,
    },
}

/// Reasons an instruction word fails to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InstrError {
    /// Bits above the instruction width are set.
    #[error("instruction {0:#x} wider than 28 bits")]
    TooWide(u32),
    /// The control opcode is reserved.
    #[error("instruction {word:#x} has reserved opcode {opcode:#x}")]
    ReservedOpcode {
        /// Raw word.
        word: u32,
        /// Opcode field.
        opcode: u32,
    },
}

const fn field(word: u32, lsb: u32, width: u32) -> u32 {
    ((word >> lsb) as u64 & mask64(width)) as u32
}

const fn put(value: u32, lsb: u32, width: u32) -> u32 {
    ((value as u64 & mask64(width)) << lsb) as u32
}

const fn flag(word: u32, bit: u32) -> bool {
    (word >> bit) & 1 == 1
}

impl Instr {
    /// Decodes an opcode word.
    pub const fn decode(word: u32) -> Result<Self, InstrError> {
        if word >> INSTR_WIDTH != 0 {
            return Err(InstrError::TooWide(word));
        }
        let lt = field(word, 16, 4) as u8;
        let clear = flag(word, 15);
        let instr = match field(word, 26, 2) {
            0b00 => match field(word, 22, 4) {
                0x0 => Self::Nop,
                0x1 => Self::BarrierLock {
                    kind: LockKind::from_code(field(word, 20, 2)),
                    lt,
                    id: field(word, 0, 16) as u16,
                },
                0x2 => Self::PushMove { lt },
                0x3 => Self::PopMove {
                    lt,
                    stats_init: flag(word, 15),
                    idle_init: flag(word, 14),
                },
                0x4 => Self::Init {
                    set_meter_time: flag(word, 21),
                },
                0x5 => Self::DumpStatsWord { lt, clear },
                0x6 => Self::DumpIdleWord { lt, clear },
                0x7 => Self::DumpStatsTable { lt, clear },
                0x8 => Self::DumpIdleTable { lt, clear },
                0xF => Self::PipeRing,
                opcode => return Err(InstrError::ReservedOpcode { word, opcode }),
            },
            0b01 => {
                let row = field(word, 21, 4) as u8;
                let col = field(word, 20, 1) as u8;
                if flag(word, 25) {
                    Self::TcamCopyWord {
                        row,
                        col,
                        n: field(word, 15, 5) + 1,
                        top_to_bottom: flag(word, 14),
                    }
                } else {
                    Self::SetTcamWritereg {
                        row,
                        col,
                        index: field(word, 0, 9),
                    }
                }
            }
            0b10 => Self::RunStateful {
                lt: field(word, 22, 4) as u8,
                instr: field(word, 19, 3) as u8,
            },
            _ => Self::ChipExtension {
                payload: field(word, 0, 26),
            },
        };
        Ok(instr)
    }

    /// Encodes the instruction into an opcode word.
    pub const fn encode(&self) -> u32 {
        const fn control(opcode: u32) -> u32 {
            put(opcode, 22, 4)
        }
        const fn table(lt: u8, clear: bool) -> u32 {
            put(lt as u32, 16, 4) | put(clear as u32, 15, 1)
        }
        match *self {
            Self::Nop => control(0x0),
            Self::BarrierLock { kind, lt, id } => {
                control(0x1) | put(kind.code(), 20, 2) | put(lt as u32, 16, 4) | id as u32
            }
            Self::PushMove { lt } => control(0x2) | table(lt, false),
            Self::PopMove {
                lt,
                stats_init,
                idle_init,
            } => control(0x3) | table(lt, stats_init) | put(idle_init as u32, 14, 1),
            Self::Init { set_meter_time } => control(0x4) | put(set_meter_time as u32, 21, 1),
            Self::DumpStatsWord { lt, clear } => control(0x5) | table(lt, clear),
            Self::DumpIdleWord { lt, clear } => control(0x6) | table(lt, clear),
            Self::DumpStatsTable { lt, clear } => control(0x7) | table(lt, clear),
            Self::DumpIdleTable { lt, clear } => control(0x8) | table(lt, clear),
            Self::PipeRing => control(0xF),
            Self::SetTcamWritereg { row, col, index } => {
                put(0b01, 26, 2) | put(row as u32, 21, 4) | put(col as u32, 20, 1) | put(index, 0, 9)
            }
            Self::TcamCopyWord {
                row,
                col,
                n,
                top_to_bottom,
            } => {
                put(0b01, 26, 2)
                    | put(1, 25, 1)
                    | put(row as u32, 21, 4)
                    | put(col as u32, 20, 1)
                    | put(n.saturating_sub(1), 15, 5)
                    | put(top_to_bottom as u32, 14, 1)
            }
            Self::RunStateful { lt, instr } => put(0b10, 26, 2) | put(lt as u32, 22, 4) | put(instr as u32, 19, 3),
            Self::ChipExtension { payload } => put(0b11, 26, 2) | put(payload, 0, 26),
        }
    }

    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::BarrierLock { .. } => "barrier_lock",
            Self::PushMove { .. } => "push_table_move_addr",
            Self::PopMove { .. } => "pop_table_move_addr",
            Self::Init { .. } => "init",
            Self::DumpStatsWord { .. } => "dump_stats_word",
            Self::DumpIdleWord { .. } => "dump_idle_word",
            Self::DumpStatsTable { .. } => "dump_stats_table",
            Self::DumpIdleTable { .. } => "dump_idle_table",
            Self::PipeRing => "pipe_ring",
            Self::SetTcamWritereg { .. } => "set_tcam_writereg",
            Self::TcamCopyWord { .. } => "tcam_copy_word",
            Self::RunStateful { .. } => "run_stateful",
            Self::ChipExtension { .. } => "chip_extension",
        }
    }
}
