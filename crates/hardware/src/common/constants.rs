//! Global Model Constants.
//!
//! This module defines constants shared by the whole model. It includes:
//! 1. **Poison values:** Data returned for rejected accesses.
//! 2. **PBUS layout:** Shifts and widths of the frozen indirect address format.
//! 3. **RAM geometry:** Word widths and depths that the address format depends on.

/// Data word returned by reads that fail address decode.
pub const BAD_DATA_WORD: u64 = 0x0BAD_0BAD_0BAD_0BAD;

/// Bit position of the pipe field in a PBUS address.
pub const PIPE_SHIFT: u32 = 40;
/// Width of the pipe field.
pub const PIPE_WIDTH: u32 = 2;
/// Bit position of the stage field.
pub const STAGE_SHIFT: u32 = 35;
/// Width of the stage field.
pub const STAGE_WIDTH: u32 = 5;
/// Bit position of the address type field.
pub const TYPE_SHIFT: u32 = 32;
/// Width of the address type field.
pub const TYPE_WIDTH: u32 = 3;
/// First bit that must be zero in every valid PBUS address.
pub const HIGH_ZERO_SHIFT: u32 = 42;

/// Bit position of the register block field within a register payload.
pub const REG_BLOCK_SHIFT: u32 = 24;
/// Width of the register block field.
pub const REG_BLOCK_WIDTH: u32 = 8;
/// Width of the register index field.
pub const REG_INDEX_WIDTH: u32 = 24;

/// Width of an instruction-bus opcode word.
pub const INSTR_WIDTH: u32 = 28;

/// Bit position of the physical memory type field.
pub const PHYS_TYPE_SHIFT: u32 = 28;
/// Width of the physical memory type field (bit 31 must be zero).
pub const PHYS_TYPE_WIDTH: u32 = 3;
/// Bit position of the physical row field.
pub const PHYS_ROW_SHIFT: u32 = 24;
/// Bit position of the physical column field.
pub const PHYS_COL_SHIFT: u32 = 20;
/// Width of the physical row and column fields.
pub const PHYS_ROWCOL_WIDTH: u32 = 4;
/// Width of the physical index field.
pub const PHYS_INDEX_WIDTH: u32 = 20;

/// Bit position of the virtual memory type field.
pub const VIRT_TYPE_SHIFT: u32 = 30;
/// Width of the virtual memory type field.
pub const VIRT_TYPE_WIDTH: u32 = 2;
/// Bit position of the virtual logical-table field.
pub const VIRT_LT_SHIFT: u32 = 26;
/// Width of the virtual logical-table field.
pub const VIRT_LT_WIDTH: u32 = 4;
/// Width of the virtual address field.
pub const VIRT_ADDR_WIDTH: u32 = 26;

/// Number of index bits addressing one SRAM or mapram word (1024 entries).
pub const RAM_INDEX_BITS: u32 = 10;
/// Width of a VPN inside a virtual address.
pub const VPN_WIDTH: u32 = 6;

/// Width of an SRAM word in bits.
pub const SRAM_WORD_BITS: u32 = 128;
/// Width of a mapram word in bits.
pub const MAPRAM_WORD_BITS: u32 = 11;
/// Width of one TCAM half-word (word0 or word1).
pub const TCAM_WORD_BITS: u32 = 47;

/// Number of logical tables in one MAU stage.
pub const LOGICAL_TABLES: usize = 16;
/// Number of hit priorities a match column resolves (0..=4).
pub const HIT_PRIORITIES: usize = 5;
/// Lowest hit priority treated as an inner (single-RAM) hit.
pub const INNER_PRIORITY_MIN: u8 = 2;
/// Number of match sub-entries one SRAM word may hold.
pub const MATCH_SLOTS: usize = 4;
/// Number of next-table buses per SRAM row.
pub const NXTAB_BUSES: usize = 2;
