//! Ternary match memory.
//!
//! Each TCAM entry is a `(word0, word1)` pair of 47-bit halves. A search bit `k`
//! matches entry bit `i` when `k == 0` and `word0[i]` is set, or `k == 1` and
//! `word1[i]` is set; both set is a don't-care, both clear never matches. The
//! highest matching index wins.
//!
//! Writes from the driver may be staged in a *writereg* and applied later under
//! a lock, which lets a whole stage update its TCAMs at one instant.

use serde::Serialize;

use crate::common::constants::TCAM_WORD_BITS;
use crate::common::mask64;
use crate::mau::registers::{ConfigEvent, FieldId, RegBlock, RegisterObserver};

const HALF_MASK: u64 = mask64(TCAM_WORD_BITS);

/// One TCAM entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TcamEntry {
    /// Bits that match a search zero.
    pub word0: u64,
    /// Bits that match a search one.
    pub word1: u64,
}

impl TcamEntry {
    /// Builds an entry from raw halves.
    pub const fn new(word0: u64, word1: u64) -> Self {
        Self {
            word0: word0 & HALF_MASK,
            word1: word1 & HALF_MASK,
        }
    }

    /// Builds an entry matching `value` on the bits set in `mask` (other bits are don't-care).
    pub const fn from_value_mask(value: u64, mask: u64) -> Self {
        Self::new((!value & mask) | !mask, (value & mask) | !mask)
    }

    /// Returns `true` when `key` matches every bit of the entry.
    pub const fn matches(&self, key: u64) -> bool {
        let key = key & HALF_MASK;
        ((!key & self.word0) | (key & self.word1)) & HALF_MASK == HALF_MASK
    }
}

/// A write staged for later application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PendingWrite {
    /// Target entry.
    pub index: u32,
    /// Value to write.
    pub entry: TcamEntry,
}

/// One TCAM.
#[derive(Debug, Clone)]
pub struct MauTcam {
    row: usize,
    col: usize,
    entries: Vec<TcamEntry>,
    owner_lt: Option<u8>,
    inhibited: Vec<u32>,
    pending: Option<PendingWrite>,
    pending_locked: bool,
}

impl MauTcam {
    /// Creates an empty TCAM.
    pub fn new(row: usize, col: usize, entries: usize) -> Self {
        Self {
            row,
            col,
            entries: vec![TcamEntry::default(); entries],
            owner_lt: None,
            inhibited: Vec::new(),
            pending: None,
            pending_locked: false,
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

    /// Number of entries.
    pub fn entries(&self) -> usize {
        self.entries.len()
    }

    /// Logical table searching this TCAM.
    pub const fn owner_lt(&self) -> Option<u8> {
        self.owner_lt
    }

    /// Assigns the TCAM to a logical table.
    pub const fn set_owner_lt(&mut self, lt: Option<u8>) {
        self.owner_lt = lt;
    }

    /// Reads an entry.
    pub fn read(&self, index: u32) -> Option<TcamEntry> {
        self.entries.get(index as usize).copied()
    }

    /// Writes an entry; returns `false` when `index` is out of range.
    pub fn write(&mut self, index: u32, entry: TcamEntry) -> bool {
        match self.entries.get_mut(index as usize) {
            Some(slot) => {
                *slot = TcamEntry::new(entry.word0, entry.word1);
                true
            }
            None => false,
        }
    }

    /// Returns the highest matching, non-inhibited index.
    pub fn lookup(&self, key: u64) -> Option<u32> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(i, e)| e.matches(key) && !self.inhibited.contains(&(*i as u32)))
            .map(|(i, _)| i as u32)
    }

    /// Suppresses (or re-enables) hits on `index`.
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

    /// Returns `true` when `index` is inhibited.
    pub fn is_inhibited(&self, index: u32) -> bool {
        self.inhibited.contains(&index)
    }

    /// Stages a write; a later `flush_writereg` applies it.
    ///
    /// # Returns
    ///
    /// `false` when `index` is out of range or a locked write is already staged.
    pub fn set_writereg(&mut self, index: u32, entry: TcamEntry) -> bool {
        if index as usize >= self.entries.len() || self.pending_locked {
            return false;
        }
        self.pending = Some(PendingWrite { index, entry });
        true
    }

    /// Staged write, if any.
    pub const fn pending(&self) -> Option<PendingWrite> {
        self.pending
    }

    /// Locks the staged write; returns `false` when nothing is staged.
    pub const fn pending_lock(&mut self) -> bool {
        if self.pending.is_some() {
            self.pending_locked = true;
        }
        self.pending_locked
    }

    /// Applies the staged write, if any.
    pub fn flush_writereg(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => self.write(p.index, p.entry),
            None => false,
        }
    }

    /// Releases the writereg lock.
    pub const fn pending_unlock(&mut self) {
        self.pending_locked = false;
    }

    /// Copies `n` consecutive entries from `src` to `dst`.
    ///
    /// # Arguments
    ///
    /// * `top_to_bottom` - Copy the highest index first, which is safe when the
    ///   ranges overlap and `dst > src`.
    ///
    /// # Returns
    ///
    /// `false` (and no copy) when either range leaves the TCAM.
    pub fn copy_word(&mut self, src: u32, dst: u32, n: u32, top_to_bottom: bool) -> bool {
        let len = self.entries.len() as u64;
        if u64::from(src) + u64::from(n) > len || u64::from(dst) + u64::from(n) > len {
            return false;
        }
        let (src, dst, n) = (src as usize, dst as usize, n as usize);
        if top_to_bottom {
            for i in (0..n).rev() {
                self.entries[dst + i] = self.entries[src + i];
            }
        } else {
            for i in 0..n {
                self.entries[dst + i] = self.entries[src + i];
            }
        }
        true
    }

    /// Clears all entries and staged state.
    pub fn reset(&mut self) {
        self.entries.fill(TcamEntry::default());
        self.owner_lt = None;
        self.inhibited.clear();
        self.pending = None;
        self.pending_locked = false;
    }
}

impl RegisterObserver for MauTcam {
    fn register_written(&mut self, field: FieldId, value: u64) -> Vec<ConfigEvent> {
        if field.block == RegBlock::TcamOwner {
            self.owner_lt = (value & (1 << 4) != 0).then_some((value & 0xf) as u8);
        }
        Vec::new()
    }
}
