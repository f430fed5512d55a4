//! Unit SRAM and exact-match sub-word lookup.
//!
//! A unit SRAM holds 1024 words of 128 bits. When it serves a match table each word
//! packs up to four sub-entries (`SlotFormat`), each at one of five hit priorities.
//! Priorities 2..=4 are *inner* hits resolved inside the RAM; priorities 0 and 1 are
//! *outer* hits that need the column crossbar to combine with other rows.
//!
//! # Slot layout
//!
//! ```text
//!  lsb                       +key_width   +1           +nxt_tab_width
//! +---------------------------+-------+--------------+----------------+
//! |            key            | valid |  next table  | immediate data |
//! +---------------------------+-------+--------------+----------------+
//! ```

use serde::Serialize;

use crate::common::constants::{HIT_PRIORITIES, MATCH_SLOTS, SRAM_WORD_BITS};
use crate::common::{ModelError, ModelResult, SramWord, mask64};

/// What a unit SRAM is currently used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum SramRole {
    /// Not allocated.
    #[default]
    Unused,
    /// Exact-match entries for a logical table.
    Match {
        /// Owning logical table.
        lt: u8,
    },
    /// Resource data (stats, meter, selector) addressed through a mapram.
    Data,
}

/// Placement of one sub-entry inside a match word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SlotFormat {
    /// First bit of the stored key.
    pub lsb: u32,
    /// Key width in bits (at most 64).
    pub key_width: u32,
    /// Bit offset of the compared bits inside the search key.
    pub key_offset: u32,
    /// Width of the next-table field (0 uses the format default).
    pub nxt_tab_width: u32,
    /// Width of the immediate action data.
    pub imm_width: u32,
    /// Hit priority (0..=4).
    pub priority: u8,
}

impl SlotFormat {
    /// Bit holding the entry-valid flag.
    pub const fn valid_bit(&self) -> u32 {
        self.lsb + self.key_width
    }

    /// First bit of the next-table field.
    pub const fn nxt_tab_lsb(&self) -> u32 {
        self.valid_bit() + 1
    }

    /// First bit of the immediate data.
    pub const fn imm_lsb(&self) -> u32 {
        self.nxt_tab_lsb() + self.nxt_tab_width
    }

    /// One past the last bit the slot occupies.
    pub const fn end(&self) -> u32 {
        self.imm_lsb() + self.imm_width
    }

    /// Writes a valid sub-entry into `word`.
    pub fn encode(&self, word: &mut SramWord, key: u64, next_table: u8, imm: u64) {
        word.set(self.lsb, self.key_width, key);
        word.set(self.valid_bit(), 1, 1);
        if self.nxt_tab_width > 0 {
            word.set(self.nxt_tab_lsb(), self.nxt_tab_width, u64::from(next_table));
        }
        if self.imm_width > 0 {
            word.set(self.imm_lsb(), self.imm_width, imm);
        }
    }

    /// Clears every bit the slot occupies.
    pub fn clear(&self, word: &mut SramWord) {
        let mut lsb = self.lsb;
        while lsb < self.end() {
            let width = (self.end() - lsb).min(64);
            word.set(lsb, width, 0);
            lsb += width;
        }
    }

    /// Returns `true` when the slot in `word` holds a valid entry.
    pub const fn is_valid(&self, word: &SramWord) -> bool {
        word.bit(self.valid_bit())
    }

    /// Extracts the stored key.
    pub const fn key(&self, word: &SramWord) -> u64 {
        word.get(self.lsb, self.key_width)
    }

    /// Extracts the compared part of a search key.
    pub const fn search_bits(&self, key: u128) -> u64 {
        if self.key_offset >= 128 {
            return 0;
        }
        ((key >> self.key_offset) as u64) & mask64(self.key_width)
    }
}

/// Format of every word of a match SRAM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchFormat {
    /// Sub-entries, at most four.
    pub slots: Vec<SlotFormat>,
    /// Next table used by slots without a next-table field.
    pub default_next_table: u8,
}

impl MatchFormat {
    /// Checks the format fits a word and uses legal priorities.
    pub fn validate(&self) -> ModelResult<()> {
        let fail = |detail: String| {
            Err(ModelError::Config {
                context: "mau::sram",
                detail,
            })
        };
        if self.slots.len() > MATCH_SLOTS {
            return fail(format!("{} slots exceeds {MATCH_SLOTS}", self.slots.len()));
        }
        let mut spans: Vec<(u32, u32)> = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.iter().enumerate() {
            if usize::from(slot.priority) >= HIT_PRIORITIES {
                return fail(format!("slot {i} priority {} out of range", slot.priority));
            }
            if slot.key_width > 64 || slot.imm_width > 64 || slot.nxt_tab_width > 8 {
                return fail(format!("slot {i} field too wide"));
            }
            if slot.end() > SRAM_WORD_BITS {
                return fail(format!("slot {i} ends at bit {}", slot.end()));
            }
            if spans.iter().any(|&(lo, hi)| slot.lsb < hi && lo < slot.end()) {
                return fail(format!("slot {i} overlaps another slot"));
            }
            spans.push((slot.lsb, slot.end()));
        }
        Ok(())
    }
}

/// Result of looking one index up in one SRAM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowLookup {
    /// Word index that was searched.
    pub hit_index: u32,
    /// Bit `p` is set when a slot at priority `p` matched.
    pub mask: u8,
    /// Slot that matched at each priority.
    pub matched: [Option<u8>; HIT_PRIORITIES],
    /// Two slots matched at the same priority.
    pub redundant: bool,
}

impl RowLookup {
    /// Returns `true` when a slot at `priority` matched.
    pub const fn has(&self, priority: usize) -> bool {
        self.mask & (1 << priority) != 0
    }

    /// Returns `true` when any outer (priority 0 or 1) slot matched.
    pub const fn has_outer(&self) -> bool {
        self.mask & 0b11 != 0
    }
}

/// One unit SRAM.
#[derive(Debug, Clone)]
pub struct MauSram {
    row: usize,
    col: usize,
    words: Vec<SramWord>,
    role: SramRole,
    format: Option<MatchFormat>,
    nxtab_bus: usize,
    inhibited: Vec<u32>,
}

impl MauSram {
    /// Creates a zeroed, unallocated SRAM.
    pub fn new(row: usize, col: usize, entries: usize) -> Self {
        Self {
            row,
            col,
            words: vec![SramWord::ZERO; entries],
            role: SramRole::Unused,
            format: None,
            nxtab_bus: 0,
            inhibited: Vec::new(),
        }
    }

    /// Physical row.
    pub const fn row(&self) -> usize {
        self.row
    }

    /// Physical column.
    pub const fn col(&self) -> usize {
        self.col
    }

    /// Number of words.
    pub fn entries(&self) -> usize {
        self.words.len()
    }

    /// Current role.
    pub const fn role(&self) -> SramRole {
        self.role
    }

    /// Logical table served when this is a match SRAM.
    pub const fn match_lt(&self) -> Option<u8> {
        match self.role {
            SramRole::Match { lt } => Some(lt),
            _ => None,
        }
    }

    /// Match format, when configured.
    pub const fn format(&self) -> Option<&MatchFormat> {
        self.format.as_ref()
    }

    /// Next-table bus this SRAM drives on its row.
    pub const fn nxtab_bus(&self) -> usize {
        self.nxtab_bus
    }

    /// Reads a word.
    pub fn read(&self, index: u32) -> Option<SramWord> {
        self.words.get(index as usize).copied()
    }

    /// Writes a word; returns `false` when `index` is out of range.
    pub fn write(&mut self, index: u32, word: SramWord) -> bool {
        match self.words.get_mut(index as usize) {
            Some(slot) => {
                *slot = word;
                true
            }
            None => false,
        }
    }

    /// Allocates the SRAM to a match table.
    ///
    /// # Arguments
    ///
    /// * `lt` - Owning logical table.
    /// * `format` - Sub-entry layout of every word.
    /// * `nxtab_bus` - Row next-table bus the SRAM drives its results onto.
    pub fn configure_match(&mut self, lt: u8, format: MatchFormat, nxtab_bus: usize) -> ModelResult<()> {
        format.validate()?;
        self.role = SramRole::Match { lt };
        self.format = Some(format);
        self.nxtab_bus = nxtab_bus;
        Ok(())
    }

    /// Allocates the SRAM as resource data, dropping any match format.
    pub fn configure_data(&mut self) {
        self.role = SramRole::Data;
        self.format = None;
    }

    /// Suppresses (or re-enables) hits at `index`.
    pub fn set_inhibit(&mut self, index: u32, inhibit: bool) {
        let present = self.inhibited.iter().position(|&i| i == index);
        match (inhibit, present) {
            (true, None) => self.inhibited.push(index),
            (false, Some(pos)) => {
                let _ = self.inhibited.swap_remove(pos);
            }
            _ => {}
        }
    }

    /// Returns `true` when hits at `index` are suppressed.
    pub fn is_inhibited(&self, index: u32) -> bool {
        self.inhibited.contains(&index)
    }

    /// Searches the word at `index` for sub-entries matching `key`.
    pub fn lookup(&self, index: u32, key: u128) -> RowLookup {
        let mut result = RowLookup {
            hit_index: index,
            ..RowLookup::default()
        };
        let (Some(format), Some(word)) = (self.format.as_ref(), self.read(index)) else {
            return result;
        };
        if self.is_inhibited(index) {
            return result;
        }
        for (slot, fmt) in format.slots.iter().enumerate() {
            if !fmt.is_valid(&word) || fmt.key(&word) != fmt.search_bits(key) {
                continue;
            }
            let pri = usize::from(fmt.priority);
            if result.has(pri) {
                result.redundant = true;
                continue;
            }
            result.mask |= 1 << pri;
            result.matched[pri] = Some(slot as u8);
        }
        result
    }

    /// Returns the next table of the sub-entry `slot` at `hit_index`.
    ///
    /// # Returns
    ///
    /// `None` when the SRAM is not a match SRAM, the slot does not exist, or the
    /// entry is no longer valid.
    pub fn get_next_table(&self, hit_index: u32, slot: u8) -> Option<u8> {
        let format = self.format.as_ref()?;
        let fmt = format.slots.get(usize::from(slot))?;
        let word = self.read(hit_index)?;
        if !fmt.is_valid(&word) {
            return None;
        }
        if fmt.nxt_tab_width == 0 {
            return Some(format.default_next_table);
        }
        Some(word.get(fmt.nxt_tab_lsb(), fmt.nxt_tab_width) as u8)
    }

    /// Returns the immediate action data of a sub-entry.
    pub fn imm_data(&self, hit_index: u32, slot: u8) -> Option<u64> {
        let fmt = self.format.as_ref()?.slots.get(usize::from(slot))?;
        let word = self.read(hit_index)?;
        Some(word.get(fmt.imm_lsb(), fmt.imm_width))
    }

    /// Zeroes every word and drops the allocation.
    pub fn reset(&mut self) {
        self.words.fill(SramWord::ZERO);
        self.role = SramRole::Unused;
        self.format = None;
        self.nxtab_bus = 0;
        self.inhibited.clear();
    }
}
