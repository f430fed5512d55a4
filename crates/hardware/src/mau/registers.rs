//! Data-driven MAU configuration register file.
//!
//! Configuration registers are described by a table of field descriptors instead
//! of one hand-written accessor per register. A write lands in the backing store
//! and is then offered to the component that owns the block through
//! `RegisterObserver::register_written`, which may answer with `ConfigEvent`s the
//! stage applies (for example a mapram changing its classified type).
//!
//! # Blocks
//!
//! | Block | Code | Entries | Owner |
//! |-------|------|---------|-------|
//! | `MapramConfig` | `0x01` | rows x cols | `MauMapramReg` |
//! | `MapramWiring` | `0x02` | rows x cols | `MauMapramReg` |
//! | `NxtabBus` | `0x03` | rows x 2 | `MauSramRowReg` |
//! | `MeterAluConfig` | `0x10` | meter ALUs | `MauMeterAlu` |
//! | `MoveregsConfig` | `0x20` | logical tables | stage LT config |
//! | `MissAddress` | `0x21` | logical tables | stage LT config |
//! | `IdletimeConfig` | `0x22` | logical tables | `MauIdletime` |
//! | `TcamOwner` | `0x30` | TCAM rows x cols | `MauTcam` |
//! | `Scratch` | `0x7f` | 64 | none |

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::common::constants::{LOGICAL_TABLES, NXTAB_BUSES};
use crate::common::mask64;
use crate::config::ChipDescriptor;
use crate::mau::mapram::MapramType;

/// Register blocks known to the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RegBlock {
    /// Per-mapram type, VPN, owning table and enable.
    MapramConfig,
    /// Per-mapram resource wiring (which ALUs drive the mapram).
    MapramWiring,
    /// Per-row next-table bus to logical table assignment.
    NxtabBus,
    /// Per meter-ALU table binding and mode.
    MeterAluConfig,
    /// Per-table move-register address transforms.
    MoveregsConfig,
    /// Per-table MISS address.
    MissAddress,
    /// Per-table idletime entry width.
    IdletimeConfig,
    /// Per-TCAM owning table.
    TcamOwner,
    /// Plain storage with no side effects.
    Scratch,
}

impl RegBlock {
    /// Every block, in code order.
    pub const ALL: [Self; 9] = [
        Self::MapramConfig,
        Self::MapramWiring,
        Self::NxtabBus,
        Self::MeterAluConfig,
        Self::MoveregsConfig,
        Self::MissAddress,
        Self::IdletimeConfig,
        Self::TcamOwner,
        Self::Scratch,
    ];

    /// Returns the block code used in register addresses.
    pub const fn code(self) -> u8 {
        match self {
            Self::MapramConfig => 0x01,
            Self::MapramWiring => 0x02,
            Self::NxtabBus => 0x03,
            Self::MeterAluConfig => 0x10,
            Self::MoveregsConfig => 0x20,
            Self::MissAddress => 0x21,
            Self::IdletimeConfig => 0x22,
            Self::TcamOwner => 0x30,
            Self::Scratch => 0x7f,
        }
    }

    /// Decodes a block code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::MapramConfig),
            0x02 => Some(Self::MapramWiring),
            0x03 => Some(Self::NxtabBus),
            0x10 => Some(Self::MeterAluConfig),
            0x20 => Some(Self::MoveregsConfig),
            0x21 => Some(Self::MissAddress),
            0x22 => Some(Self::IdletimeConfig),
            0x30 => Some(Self::TcamOwner),
            0x7f => Some(Self::Scratch),
            _ => None,
        }
    }
}

/// Static description of one register block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDesc {
    /// Display name.
    pub name: &'static str,
    /// Width of each entry in bits.
    pub width: u32,
    /// Number of entries in the block.
    pub count: usize,
    /// Value after reset.
    pub reset: u64,
}

/// One register entry: a block and an index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FieldId {
    /// Register block.
    pub block: RegBlock,
    /// Entry index.
    pub index: u32,
}

impl FieldId {
    /// Convenience constructor.
    pub const fn new(block: RegBlock, index: u32) -> Self {
        Self { block, index }
    }
}

/// Side effects a register write asks the stage to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConfigEvent {
    /// A mapram's classified type changed.
    MapramTypeChanged {
        /// Mapram row.
        row: usize,
        /// Mapram column.
        col: usize,
        /// Previous classification.
        old: MapramType,
        /// New classification.
        new: MapramType,
    },
}

/// Implemented by components whose configuration lives in the register file.
pub trait RegisterObserver {
    /// Called after `field` was written with `value` (already masked to the field width).
    ///
    /// # Returns
    ///
    /// Events the stage must apply as a consequence of the write.
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent>;
}

/// Backing store for every configuration register of one stage.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    descs: BTreeMap<RegBlock, FieldDesc>,
    values: HashMap<FieldId, u64>,
}

impl RegisterFile {
    /// Builds the register map for a stage of the given chip.
    pub fn new(chip: &ChipDescriptor) -> Self {
        let rams = chip.sram_rows * chip.sram_cols;
        let table = [
            (RegBlock::MapramConfig, "mapram_config", 14, rams),
            (RegBlock::MapramWiring, "mapram_wiring", 6, rams),
            (RegBlock::NxtabBus, "nxtab_bus", 5, chip.sram_rows * NXTAB_BUSES),
            (RegBlock::MeterAluConfig, "meter_alu_config", 13, chip.meter_alus),
            (RegBlock::MoveregsConfig, "moveregs_config", 38, LOGICAL_TABLES),
            (RegBlock::MissAddress, "miss_address", 24, LOGICAL_TABLES),
            (RegBlock::IdletimeConfig, "idletime_config", 4, LOGICAL_TABLES),
            (RegBlock::TcamOwner, "tcam_owner", 5, chip.tcam_rows * chip.tcam_cols),
            (RegBlock::Scratch, "scratch", 32, 64),
        ];
        let descs = table
            .into_iter()
            .map(|(block, name, width, count)| {
                (
                    block,
                    FieldDesc {
                        name,
                        width,
                        count,
                        reset: 0,
                    },
                )
            })
            .collect();
        Self {
            descs,
            values: HashMap::new(),
        }
    }

    /// Returns the descriptor of a block.
    pub fn describe(&self, block: RegBlock) -> Option<&FieldDesc> {
        self.descs.get(&block)
    }

    /// Resolves a raw `(block code, index)` pair to a valid field.
    pub fn resolve(&self, block: u8, index: u32) -> Option<FieldId> {
        let block = RegBlock::from_code(block)?;
        let desc = self.descs.get(&block)?;
        ((index as usize) < desc.count).then_some(FieldId::new(block, index))
    }

    /// Reads a field; `None` when the field does not exist.
    pub fn read(&self, field: FieldId) -> Option<u64> {
        let desc = self.describe(field.block)?;
        if field.index as usize >= desc.count {
            return None;
        }
        Some(self.values.get(&field).copied().unwrap_or(desc.reset))
    }

    /// Writes a field, masking the value to the field width.
    ///
    /// # Returns
    ///
    /// The stored value, or `None` when the field does not exist.
    pub fn write(&mut self, field: FieldId, value: u64) -> Option<u64> {
        let desc = *self.describe(field.block)?;
        if field.index as usize >= desc.count {
            return None;
        }
        let stored = value & mask64(desc.width);
        let _ = self.values.insert(field, stored);
        Some(stored)
    }

    /// Restores every register to its reset value.
    pub fn reset(&mut self) {
        self.values.clear();
    }
}
