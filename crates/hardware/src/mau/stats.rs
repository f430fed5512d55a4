//! Statistics counter words.
//!
//! A stats entry occupies a whole SRAM word: the packet count in bits 0..64 and
//! the byte count in bits 64..128. Counters wrap.

use serde::Serialize;

use crate::common::SramWord;

/// One packet/byte counter pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct StatsEntry {
    /// Packets counted.
    pub pkts: u64,
    /// Bytes counted.
    pub bytes: u64,
}

impl StatsEntry {
    /// Creates a counter pair.
    pub const fn new(pkts: u64, bytes: u64) -> Self {
        Self { pkts, bytes }
    }

    /// Decodes a stats word.
    pub const fn from_word(word: &SramWord) -> Self {
        Self {
            pkts: word.lo(),
            bytes: word.hi(),
        }
    }

    /// Encodes the counters.
    pub const fn to_word(self) -> SramWord {
        SramWord::from_words(self.pkts, self.bytes)
    }

    /// Counts one packet of `bytes` bytes.
    #[must_use]
    pub const fn increment(self, bytes: u64) -> Self {
        Self {
            pkts: self.pkts.wrapping_add(1),
            bytes: self.bytes.wrapping_add(bytes),
        }
    }
}
