//! Fixed-width bit vectors and field helpers.
//!
//! Every RAM word in the model is a fixed-width bit vector: SRAM words are 128 bits,
//! mapram words 11 bits, TCAM halves 47 bits. This module provides:
//! 1. **Masks:** `mask64`/`mask128` for widths up to and including the full word.
//! 2. **Signed fields:** `sign_extend` for two's-complement counters packed into words.
//! 3. **`BitVector<W>`:** A width-checked vector with field get/set used for packed state.

use std::fmt;

/// Returns a mask with the low `width` bits set (`width` may be 64).
#[inline(always)]
pub const fn mask64(width: u32) -> u64 {
    if width >= 64 { u64::MAX } else { (1u64 << width) - 1 }
}

/// Returns a mask with the low `width` bits set (`width` may be 128).
#[inline(always)]
pub const fn mask128(width: u32) -> u128 {
    if width >= 128 { u128::MAX } else { (1u128 << width) - 1 }
}

/// Sign-extends the low `width` bits of `value` to an `i64`.
///
/// # Arguments
///
/// * `value` - Raw field bits; bits above `width` are ignored.
/// * `width` - Field width in bits (1..=64).
///
/// # Returns
///
/// The two's-complement interpretation of the field.
#[inline]
pub const fn sign_extend(value: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    if width >= 64 {
        return value as i64;
    }
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

/// Returns the most negative value representable in a signed field of `width` bits.
#[inline]
pub const fn signed_min(width: u32) -> i64 {
    -(1i64 << (width - 1))
}

/// Returns the most positive value representable in a signed field of `width` bits.
#[inline]
pub const fn signed_max(width: u32) -> i64 {
    (1i64 << (width - 1)) - 1
}

/// Fixed-width bit vector of `W` bits (at most 128), stored in a `u128`.
///
/// Bits above `W` are always zero; every mutator re-masks. Field accessors take an
/// `(lsb, width)` pair, the way hardware register descriptions name fields.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitVector<const W: u32>(u128);

impl<const W: u32> BitVector<W> {
    /// Width of the vector in bits.
    pub const WIDTH: u32 = W;

    /// All-zeroes vector.
    pub const ZERO: Self = Self(0);

    /// Creates a vector from raw bits, discarding anything above `W`.
    #[inline]
    pub const fn new(raw: u128) -> Self {
        Self(raw & mask128(W))
    }

    /// Creates a vector from two 64-bit halves (`lo` holds bits 0..64).
    #[inline]
    pub const fn from_words(lo: u64, hi: u64) -> Self {
        Self::new(((hi as u128) << 64) | lo as u128)
    }

    /// Returns the raw bits.
    #[inline]
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Returns the low 64 bits.
    #[inline]
    pub const fn lo(&self) -> u64 {
        self.0 as u64
    }

    /// Returns bits 64..128.
    #[inline]
    pub const fn hi(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Extracts the unsigned field `[lsb, lsb + width)`; `width` must be ≤ 64.
    #[inline]
    pub const fn get(&self, lsb: u32, width: u32) -> u64 {
        if lsb >= W {
            return 0;
        }
        ((self.0 >> lsb) as u64) & mask64(width)
    }

    /// Extracts the field `[lsb, lsb + width)` and sign-extends it.
    #[inline]
    pub const fn get_signed(&self, lsb: u32, width: u32) -> i64 {
        sign_extend(self.get(lsb, width), width)
    }

    /// Replaces the field `[lsb, lsb + width)` with the low `width` bits of `value`.
    #[inline]
    pub fn set(&mut self, lsb: u32, width: u32, value: u64) {
        if lsb >= W {
            return;
        }
        let field = mask128(width.min(64)) << lsb;
        self.0 = (self.0 & !field) | ((u128::from(value) << lsb) & field);
        self.0 &= mask128(W);
    }

    /// Stores a signed value into `[lsb, lsb + width)` in two's complement.
    #[inline]
    pub fn set_signed(&mut self, lsb: u32, width: u32, value: i64) {
        self.set(lsb, width, value as u64);
    }

    /// Returns the vector with only the bits in `[lsb, lsb + width)` kept.
    #[inline]
    pub const fn masked(&self, lsb: u32, width: u32) -> Self {
        Self::new(self.0 & (mask128(width) << lsb))
    }

    /// Returns `true` when bit `bit` is set.
    #[inline]
    pub const fn bit(&self, bit: u32) -> bool {
        bit < W && (self.0 >> bit) & 1 == 1
    }
}

impl<const W: u32> fmt::Debug for BitVector<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector<{}>({:#x})", W, self.0)
    }
}

impl<const W: u32> fmt::LowerHex for BitVector<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 128-bit SRAM word.
pub type SramWord = BitVector<128>;
