//! Stateful ALU.
//!
//! A stateful table keeps one signed 64-bit register per entry in the low half of
//! an SRAM word. Each table has up to eight instructions; running one applies a
//! read-modify-write with either a constant or the supplied operand.

use serde::Serialize;

use crate::common::SramWord;
use crate::common::constants::LOGICAL_TABLES;

/// Instructions per table.
pub const SALU_INSTRS: usize = 8;

/// Stateful ALU operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SaluOp {
    /// Return the register unchanged.
    Read,
    /// Overwrite the register.
    Write,
    /// Wrapping add.
    Add,
    /// Wrapping subtract.
    Sub,
    /// Keep the larger value.
    Max,
    /// Keep the smaller value.
    Min,
}

/// One stateful instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SaluInstr {
    /// Operation.
    pub op: SaluOp,
    /// Constant operand; `None` takes the operand supplied with the request.
    pub constant: Option<i64>,
}

/// Stateful ALU programs of one stage.
#[derive(Debug, Clone)]
pub struct MauStateful {
    programs: Vec<[Option<SaluInstr>; SALU_INSTRS]>,
}

impl Default for MauStateful {
    fn default() -> Self {
        Self::new()
    }
}

impl MauStateful {
    /// Creates empty programs for every table.
    pub fn new() -> Self {
        Self {
            programs: vec![[None; SALU_INSTRS]; LOGICAL_TABLES],
        }
    }

    /// Installs instruction `index` of table `lt`.
    pub fn configure(&mut self, lt: u8, index: usize, instr: Option<SaluInstr>) -> bool {
        match self
            .programs
            .get_mut(usize::from(lt))
            .and_then(|p| p.get_mut(index))
        {
            Some(slot) => {
                *slot = instr;
                true
            }
            None => false,
        }
    }

    /// Instruction `index` of table `lt`.
    pub fn instr(&self, lt: u8, index: usize) -> Option<SaluInstr> {
        self.programs.get(usize::from(lt))?.get(index).copied().flatten()
    }

    /// Runs instruction `index` of `lt` against `word`.
    ///
    /// # Returns
    ///
    /// The updated word and the ALU output (the new register value), or `None`
    /// when the instruction is not programmed.
    pub fn run(&self, lt: u8, index: usize, word: SramWord, operand: i64) -> Option<(SramWord, i64)> {
        let instr = self.instr(lt, index)?;
        let current = word.lo() as i64;
        let arg = instr.constant.unwrap_or(operand);
        let next = match instr.op {
            SaluOp::Read => current,
            SaluOp::Write => arg,
            SaluOp::Add => current.wrapping_add(arg),
            SaluOp::Sub => current.wrapping_sub(arg),
            SaluOp::Max => current.max(arg),
            SaluOp::Min => current.min(arg),
        };
        Some((SramWord::from_words(next as u64, word.hi()), next))
    }

    /// Clears every program.
    pub fn reset(&mut self) {
        for program in &mut self.programs {
            *program = [None; SALU_INSTRS];
        }
    }
}
