//! PBUS indirect address encoding and decoding.
//!
//! Every access the driver makes to MAU memories travels as a 64-bit PBUS
//! address. This module provides:
//! 1. **Strong type:** `Address` wraps the raw value so it cannot be confused with data.
//! 2. **Encoders:** `make_reg_address`, `make_instr_address`, `make_phys_address`,
//!    `make_virt_address` pack the frozen bit layout.
//! 3. **Total decode:** `Address::decode` either yields a `DecodedAddress` or an
//!    `AddressError`; unknown type combinations never alias onto valid ones.
//!
//! # Layout
//!
//! ```text
//!  63        42 41  40 39   35 34  32 31                           0
//! +------------+------+-------+------+------------------------------+
//! |    zero    | pipe | stage | type |           payload            |
//! +------------+------+-------+------+------------------------------+
//! ```

use serde::Serialize;
use thiserror::Error;

use super::bits::mask64;
use super::constants::{
    HIGH_ZERO_SHIFT, INSTR_WIDTH, PHYS_COL_SHIFT, PHYS_INDEX_WIDTH, PHYS_ROW_SHIFT,
    PHYS_ROWCOL_WIDTH, PHYS_TYPE_SHIFT, PHYS_TYPE_WIDTH, PIPE_SHIFT, PIPE_WIDTH,
    REG_BLOCK_SHIFT, REG_BLOCK_WIDTH, REG_INDEX_WIDTH, STAGE_SHIFT, STAGE_WIDTH, TYPE_SHIFT,
    TYPE_WIDTH, VIRT_ADDR_WIDTH, VIRT_LT_SHIFT, VIRT_LT_WIDTH, VIRT_TYPE_SHIFT,
};

/// Top-level address type field values.
const TYPE_REGISTER: u64 = 0;
const TYPE_INSTRUCTION: u64 = 1;
const TYPE_PHYSICAL: u64 = 2;
const TYPE_VIRTUAL: u64 = 3;

/// A raw PBUS address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Address(pub u64);

/// Physical memory types reachable through the PBUS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PhysMemType {
    /// Unit SRAM (128-bit words).
    Sram,
    /// Map RAM (11-bit words) shadowing an SRAM.
    Mapram,
    /// TCAM (word0/word1 pairs).
    Tcam,
}

impl PhysMemType {
    /// Returns the encoding of this type in the physical payload.
    pub const fn code(self) -> u64 {
        match self {
            Self::Sram => 0,
            Self::Mapram => 1,
            Self::Tcam => 2,
        }
    }

    /// Decodes a physical memory type field.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Sram),
            1 => Some(Self::Mapram),
            2 => Some(Self::Tcam),
            _ => None,
        }
    }
}

/// Virtual memory types: the resource a logical table addresses by VPN.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum VirtMemType {
    /// Statistics counters.
    Stats,
    /// Meter / LPF / RED state.
    Meter,
    /// Selector and stateful ALU registers.
    Selector,
    /// Idletime counters (held in the mapram).
    Idletime,
}

impl VirtMemType {
    /// Returns the encoding of this type in the virtual payload.
    pub const fn code(self) -> u64 {
        match self {
            Self::Stats => 0,
            Self::Meter => 1,
            Self::Selector => 2,
            Self::Idletime => 3,
        }
    }

    /// Decodes a virtual memory type field (the field is two bits wide, so this is total).
    pub const fn from_code(code: u64) -> Self {
        match code & 3 {
            0 => Self::Stats,
            1 => Self::Meter,
            2 => Self::Selector,
            _ => Self::Idletime,
        }
    }
}

/// The type-specific part of a decoded address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AddressKind {
    /// A configuration register.
    Register {
        /// Register block.
        block: u8,
        /// Index within the block.
        index: u32,
    },
    /// An instruction-bus opcode word.
    Instruction {
        /// The 28-bit instruction word.
        instr: u32,
    },
    /// A physical RAM word.
    Physical {
        /// Memory type.
        mem_type: PhysMemType,
        /// Physical row.
        row: u8,
        /// Physical column.
        col: u8,
        /// Word index.
        index: u32,
    },
    /// A logical-table resource word.
    Virtual {
        /// Resource type.
        mem_type: VirtMemType,
        /// Logical table.
        lt: u8,
        /// Virtual address (`vpn << 10 | index`).
        vaddr: u32,
    },
}

/// A fully decoded PBUS address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedAddress {
    /// Pipe number.
    pub pipe: u8,
    /// MAU stage number.
    pub stage: u8,
    /// Type-specific fields.
    pub kind: AddressKind,
}

/// Reasons an address fails to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Bits above the pipe field are set.
    #[error("address {0:#x} has bits set above bit 41")]
    HighBitsSet(u64),
    /// The type field holds a reserved value.
    #[error("address {addr:#x} has unknown type {ty}")]
    UnknownType {
        /// Raw address.
        addr: u64,
        /// Raw type field.
        ty: u8,
    },
    /// A physical address names an unknown memory type.
    #[error("address {addr:#x} has unknown physical memory type {mem_type}")]
    UnknownPhysMemType {
        /// Raw address.
        addr: u64,
        /// Raw memory type field.
        mem_type: u8,
    },
    /// Reserved payload bits are set.
    #[error("address {0:#x} has reserved payload bits set")]
    ReservedPayload(u64),
}

/// Packs pipe, stage and type into the address header.
#[inline]
const fn header(pipe: u8, stage: u8, ty: u64) -> u64 {
    ((pipe as u64 & mask64(PIPE_WIDTH)) << PIPE_SHIFT)
        | ((stage as u64 & mask64(STAGE_WIDTH)) << STAGE_SHIFT)
        | (ty << TYPE_SHIFT)
}

/// Builds a register address.
pub const fn make_reg_address(pipe: u8, stage: u8, block: u8, index: u32) -> Address {
    Address(
        header(pipe, stage, TYPE_REGISTER)
            | ((block as u64 & mask64(REG_BLOCK_WIDTH)) << REG_BLOCK_SHIFT)
            | (index as u64 & mask64(REG_INDEX_WIDTH)),
    )
}

/// Builds an instruction-bus address carrying `instr` as the opcode word.
pub const fn make_instr_address(pipe: u8, stage: u8, instr: u32) -> Address {
    Address(header(pipe, stage, TYPE_INSTRUCTION) | (instr as u64 & mask64(INSTR_WIDTH)))
}

/// Builds a physical memory address.
pub const fn make_phys_address(
    pipe: u8,
    stage: u8,
    mem_type: PhysMemType,
    row: u8,
    col: u8,
    index: u32,
) -> Address {
    Address(
        header(pipe, stage, TYPE_PHYSICAL)
            | (mem_type.code() << PHYS_TYPE_SHIFT)
            | ((row as u64 & mask64(PHYS_ROWCOL_WIDTH)) << PHYS_ROW_SHIFT)
            | ((col as u64 & mask64(PHYS_ROWCOL_WIDTH)) << PHYS_COL_SHIFT)
            | (index as u64 & mask64(PHYS_INDEX_WIDTH)),
    )
}

/// Builds a virtual memory address.
pub const fn make_virt_address(
    pipe: u8,
    stage: u8,
    mem_type: VirtMemType,
    lt: u8,
    vaddr: u32,
) -> Address {
    Address(
        header(pipe, stage, TYPE_VIRTUAL)
            | (mem_type.code() << VIRT_TYPE_SHIFT)
            | ((lt as u64 & mask64(VIRT_LT_WIDTH)) << VIRT_LT_SHIFT)
            | (vaddr as u64 & mask64(VIRT_ADDR_WIDTH)),
    )
}

impl Address {
    /// Returns the raw 64-bit value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the pipe field without validating the rest of the address.
    #[inline]
    pub const fn pipe(&self) -> u8 {
        ((self.0 >> PIPE_SHIFT) & mask64(PIPE_WIDTH)) as u8
    }

    /// Returns the stage field without validating the rest of the address.
    #[inline]
    pub const fn stage(&self) -> u8 {
        ((self.0 >> STAGE_SHIFT) & mask64(STAGE_WIDTH)) as u8
    }

    /// Decodes the address.
    ///
    /// # Returns
    ///
    /// The decoded fields, or the first layout violation found. Decoding never
    /// folds an unknown type onto a known one.
    pub fn decode(&self) -> Result<DecodedAddress, AddressError> {
        let raw = self.0;
        if raw >> HIGH_ZERO_SHIFT != 0 {
            return Err(AddressError::HighBitsSet(raw));
        }
        let payload = raw & mask64(32);
        let kind = match (raw >> TYPE_SHIFT) & mask64(TYPE_WIDTH) {
            TYPE_REGISTER => AddressKind::Register {
                block: (payload >> REG_BLOCK_SHIFT) as u8,
                index: (payload & mask64(REG_INDEX_WIDTH)) as u32,
            },
            TYPE_INSTRUCTION => {
                if payload >> INSTR_WIDTH != 0 {
                    return Err(AddressError::ReservedPayload(raw));
                }
                AddressKind::Instruction {
                    instr: payload as u32,
                }
            }
            TYPE_PHYSICAL => {
                if payload >> (PHYS_TYPE_SHIFT + PHYS_TYPE_WIDTH) != 0 {
                    return Err(AddressError::ReservedPayload(raw));
                }
                let code = (payload >> PHYS_TYPE_SHIFT) & mask64(PHYS_TYPE_WIDTH);
                let mem_type =
                    PhysMemType::from_code(code).ok_or(AddressError::UnknownPhysMemType {
                        addr: raw,
                        mem_type: code as u8,
                    })?;
                AddressKind::Physical {
                    mem_type,
                    row: ((payload >> PHYS_ROW_SHIFT) & mask64(PHYS_ROWCOL_WIDTH)) as u8,
                    col: ((payload >> PHYS_COL_SHIFT) & mask64(PHYS_ROWCOL_WIDTH)) as u8,
                    index: (payload & mask64(PHYS_INDEX_WIDTH)) as u32,
                }
            }
            TYPE_VIRTUAL => AddressKind::Virtual {
                mem_type: VirtMemType::from_code(payload >> VIRT_TYPE_SHIFT),
                lt: ((payload >> VIRT_LT_SHIFT) & mask64(VIRT_LT_WIDTH)) as u8,
                vaddr: (payload & mask64(VIRT_ADDR_WIDTH)) as u32,
            },
            ty => {
                return Err(AddressError::UnknownType {
                    addr: raw,
                    ty: ty as u8,
                });
            }
        };
        Ok(DecodedAddress {
            pipe: self.pipe(),
            stage: self.stage(),
            kind,
        })
    }
}

impl std::fmt::LowerHex for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}
