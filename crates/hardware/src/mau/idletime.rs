//! Idletime counters.
//!
//! Idletime entries live in 11-bit mapram words, several to a word depending on
//! the configured entry width. A table hit clears its entry; each sweep ages every
//! entry by one until it saturates, at which point the entry is reported idle.

use serde::Serialize;

use crate::common::constants::LOGICAL_TABLES;
use crate::common::mask64;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};

/// Per-table idletime configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IdleConfig {
    /// Entry width in bits: 1, 2, 3 or 6.
    pub width: u8,
    /// Table tracks idletime.
    pub enable: bool,
}

impl IdleConfig {
    /// Packs the register: `width[2:0] enable[3]`.
    pub const fn pack(&self) -> u64 {
        (self.width as u64 & 0x7) | ((self.enable as u64) << 3)
    }

    /// Unpacks the register.
    pub const fn unpack(value: u64) -> Self {
        Self {
            width: (value & 0x7) as u8,
            enable: (value >> 3) & 1 == 1,
        }
    }

    /// Entries per mapram word, `None` for an unsupported width.
    pub const fn entries_per_word(&self) -> Option<u32> {
        match self.width {
            1 => Some(8),
            2 => Some(4),
            3 => Some(2),
            6 => Some(1),
            _ => None,
        }
    }

    /// Saturated (idle) value of one entry.
    pub const fn max_value(&self) -> u16 {
        mask64(self.width as u32) as u16
    }
}

/// Idletime configuration of every table in a stage.
#[derive(Debug, Clone)]
pub struct MauIdletime {
    cfg: [IdleConfig; LOGICAL_TABLES],
}

impl Default for MauIdletime {
    fn default() -> Self {
        Self::new()
    }
}

impl MauIdletime {
    /// Creates a block with idletime disabled everywhere.
    pub const fn new() -> Self {
        Self {
            cfg: [IdleConfig { width: 0, enable: false }; LOGICAL_TABLES],
        }
    }

    /// Configuration of `lt`, when enabled with a supported width.
    pub fn config(&self, lt: u8) -> Option<IdleConfig> {
        let cfg = *self.cfg.get(usize::from(lt))?;
        (cfg.enable && cfg.entries_per_word().is_some()).then_some(cfg)
    }

    /// Splits a match address into `(word vaddr, sub-entry)`.
    pub fn locate(&self, lt: u8, addr: u32) -> Option<(u32, u32)> {
        let per_word = self.config(lt)?.entries_per_word()?;
        Some((addr / per_word, addr % per_word))
    }

    /// Reads sub-entry `sub` of a word.
    pub const fn get_entry(cfg: IdleConfig, word: u16, sub: u32) -> u16 {
        let width = cfg.width as u32;
        ((word as u64 >> (sub * width)) & mask64(width)) as u16
    }

    /// Replaces sub-entry `sub` of a word.
    pub const fn set_entry(cfg: IdleConfig, word: u16, sub: u32, value: u16) -> u16 {
        let width = cfg.width as u32;
        let field = mask64(width) << (sub * width);
        ((word as u64 & !field) | (((value as u64) << (sub * width)) & field)) as u16
    }

    /// Marks sub-entry `sub` active.
    pub const fn hit(cfg: IdleConfig, word: u16, sub: u32) -> u16 {
        Self::set_entry(cfg, word, sub, 0)
    }

    /// Ages every entry of a word by one.
    ///
    /// # Returns
    ///
    /// The new word and the sub-entries that became idle on this sweep.
    pub fn sweep_word(cfg: IdleConfig, word: u16) -> (u16, Vec<u32>) {
        let Some(per_word) = cfg.entries_per_word() else {
            return (word, Vec::new());
        };
        let max = cfg.max_value();
        let mut out = word;
        let mut idle = Vec::new();
        for sub in 0..per_word {
            let value = Self::get_entry(cfg, word, sub);
            if value < max {
                out = Self::set_entry(cfg, out, sub, value + 1);
                if value + 1 == max {
                    idle.push(sub);
                }
            }
        }
        (out, idle)
    }

    /// Disables idletime on every table.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl RegisterObserver for MauIdletime {
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        if field.block == RegBlock::IdletimeConfig
            && let Some(slot) = self.cfg.get_mut(field.index as usize)
        {
            *slot = IdleConfig::unpack(value);
            if slot.enable && slot.entries_per_word().is_none() {
                tracing::warn!(lt = field.index, width = slot.width, "unsupported idletime width");
            }
        }
        Vec::new()
    }
}
