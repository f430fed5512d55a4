//! Map RAMs and their configuration registers.
//!
//! A mapram sits next to each unit SRAM. It holds 11-bit words (idletime
//! counters, meter colors) and, through its configuration register, tells the
//! stage which logical table and VPN the SRAM beside it serves and as what kind
//! of resource.
//!
//! The mapram type is derived from two registers that can disagree: the
//! *self type* the mapram claims, and the *wiring* flags that say which ALUs are
//! actually connected. `MauMapramReg::get_mapram_type_check` reconciles them.

use serde::Serialize;

use crate::common::constants::MAPRAM_WORD_BITS;
use crate::common::mask64;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};

/// Resource a mapram (and the SRAM beside it) is classified as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MapramType {
    /// Not allocated.
    #[default]
    Unused,
    /// Statistics counters in the SRAM.
    Stats,
    /// Meter state in the SRAM.
    Meter,
    /// Stateful ALU registers in the SRAM.
    Stateful,
    /// Idletime counters in the mapram itself.
    Idletime,
    /// Meter colors in the mapram itself.
    Color,
    /// Selector state in the SRAM.
    Selector,
    /// Wiring names more than one resource.
    Invalid,
}

impl MapramType {
    /// Register encoding of a self type.
    pub const fn code(self) -> u64 {
        match self {
            Self::Unused | Self::Invalid => 0,
            Self::Stats => 1,
            Self::Meter => 2,
            Self::Stateful => 3,
            Self::Idletime => 4,
            Self::Color => 5,
            Self::Selector => 6,
        }
    }

    /// Decodes a self-type field; unknown codes read as `Unused`.
    pub const fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Stats,
            2 => Self::Meter,
            3 => Self::Stateful,
            4 => Self::Idletime,
            5 => Self::Color,
            6 => Self::Selector,
            _ => Self::Unused,
        }
    }
}

/// Wiring flag bits of the `MapramWiring` register.
pub mod wiring {
    /// Idletime ALU connected.
    pub const IDLETIME: u8 = 1 << 0;
    /// Meter color path connected.
    pub const COLOR: u8 = 1 << 1;
    /// Stats ALU connected.
    pub const STATS: u8 = 1 << 2;
    /// Meter ALU connected.
    pub const METER: u8 = 1 << 3;
    /// Stateful ALU connected.
    pub const STATEFUL: u8 = 1 << 4;
    /// Selector ALU connected.
    pub const SELECTOR: u8 = 1 << 5;
}

const WIRING_TYPES: [(u8, MapramType); 6] = [
    (wiring::IDLETIME, MapramType::Idletime),
    (wiring::COLOR, MapramType::Color),
    (wiring::STATS, MapramType::Stats),
    (wiring::METER, MapramType::Meter),
    (wiring::STATEFUL, MapramType::Stateful),
    (wiring::SELECTOR, MapramType::Selector),
];

/// Decoded `MapramConfig` register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MapramConfig {
    /// Type the mapram claims.
    pub self_type: MapramType,
    /// VPN served.
    pub vpn: u8,
    /// Owning logical table.
    pub lt: u8,
    /// Mapram participates in virtual addressing.
    pub enable: bool,
}

impl MapramConfig {
    /// Packs the register: `type[2:0] vpn[8:3] lt[12:9] enable[13]`.
    pub const fn pack(&self) -> u64 {
        self.self_type.code()
            | ((self.vpn as u64 & 0x3f) << 3)
            | ((self.lt as u64 & 0xf) << 9)
            | ((self.enable as u64) << 13)
    }

    /// Unpacks the register.
    pub const fn unpack(value: u64) -> Self {
        Self {
            self_type: MapramType::from_code(value & 0x7),
            vpn: ((value >> 3) & 0x3f) as u8,
            lt: ((value >> 9) & 0xf) as u8,
            enable: (value >> 13) & 1 == 1,
        }
    }
}

/// One mapram's storage.
#[derive(Debug, Clone)]
pub struct MauMapram {
    row: usize,
    col: usize,
    words: Vec<u16>,
}

impl MauMapram {
    /// Creates a zeroed mapram.
    pub fn new(row: usize, col: usize, entries: usize) -> Self {
        Self {
            row,
            col,
            words: vec![0; entries],
        }
    }

    /// Physical `(row, col)`.
    pub const fn position(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Number of words.
    pub fn entries(&self) -> usize {
        self.words.len()
    }

    /// Reads a word.
    pub fn read(&self, index: u32) -> Option<u16> {
        self.words.get(index as usize).copied()
    }

    /// Writes a word (masked to 11 bits); returns `false` when out of range.
    pub fn write(&mut self, index: u32, value: u64) -> bool {
        match self.words.get_mut(index as usize) {
            Some(slot) => {
                *slot = (value & mask64(MAPRAM_WORD_BITS)) as u16;
                true
            }
            None => false,
        }
    }

    /// Zeroes every word.
    pub fn reset(&mut self) {
        self.words.fill(0);
    }
}

/// Configuration register pair of one mapram.
#[derive(Debug, Clone, Default)]
pub struct MauMapramReg {
    row: usize,
    col: usize,
    config: MapramConfig,
    wiring: u8,
    current: MapramType,
}

impl MauMapramReg {
    /// Creates an unconfigured register.
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            ..Self::default()
        }
    }

    /// Decoded configuration.
    pub const fn config(&self) -> MapramConfig {
        self.config
    }

    /// Raw wiring flags.
    pub const fn wiring(&self) -> u8 {
        self.wiring
    }

    /// Classification as of the last register write.
    pub const fn mapram_type(&self) -> MapramType {
        self.current
    }

    /// Returns `true` when this mapram serves `vpn` of `lt` as `ty`.
    pub fn serves(&self, lt: u8, vpn: u8, ty: MapramType) -> bool {
        self.config.enable && self.config.lt == lt && self.config.vpn == vpn && self.current == ty
    }

    /// Reconciles the self type with the wiring flags.
    ///
    /// # Returns
    ///
    /// * No wired resource: the self type.
    /// * More than one wired resource: `MapramType::Invalid`.
    /// * One wired resource that disagrees with the self type: the self type, with a warning.
    pub fn get_mapram_type_check(&self) -> MapramType {
        let self_type = self.config.self_type;
        let mut wired = WIRING_TYPES
            .iter()
            .filter(|(bit, _)| self.wiring & bit != 0)
            .map(|&(_, ty)| ty);
        let Some(first) = wired.next() else {
            return self_type;
        };
        if wired.next().is_some() {
            tracing::warn!(
                row = self.row,
                col = self.col,
                wiring = self.wiring,
                "mapram wired to more than one resource"
            );
            return MapramType::Invalid;
        }
        if first != self_type {
            tracing::warn!(
                row = self.row,
                col = self.col,
                ?self_type,
                wired = ?first,
                "mapram wiring disagrees with its type"
            );
        }
        self_type
    }

    fn reclassify(&mut self) -> Vec<ConfigEvent> {
        let new = self.get_mapram_type_check();
        if new == self.current {
            return Vec::new();
        }
        let old = std::mem::replace(&mut self.current, new);
        vec![ConfigEvent::MapramTypeChanged {
            row: self.row,
            col: self.col,
            old,
            new,
        }]
    }
}

impl RegisterObserver for MauMapramReg {
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        match field.block {
            RegBlock::MapramConfig => self.config = MapramConfig::unpack(value),
            RegBlock::MapramWiring => self.wiring = value as u8,
            _ => return Vec::new(),
        }
        self.reclassify()
    }
}
