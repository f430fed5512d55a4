//! # Bit Vector Tests

use proptest::prelude::*;
use rmt_model::common::bits::{signed_max, signed_min};
use rmt_model::common::{BitVector, SramWord, mask64, sign_extend};

#[test]
fn test_masks_cover_full_width() {
    assert_eq!(mask64(0), 0);
    assert_eq!(mask64(11), 0x7ff);
    assert_eq!(mask64(64), u64::MAX);
}

#[test]
fn test_sign_extend() {
    assert_eq!(sign_extend(0x7f_ffff, 23), 4_194_303);
    assert_eq!(sign_extend(0x40_0000, 23), -4_194_304);
    assert_eq!(sign_extend(0xffff_ffff, 23), -1);
    assert_eq!(sign_extend(5, 0), 0);
}

#[test]
fn test_signed_range() {
    assert_eq!(signed_min(23), -4_194_304);
    assert_eq!(signed_max(23), 4_194_303);
}

#[test]
fn test_new_discards_bits_above_width() {
    let v = BitVector::<11>::new(0xffff);
    assert_eq!(v.raw(), 0x7ff);
}

#[test]
fn test_words_split_at_64() {
    let w = SramWord::from_words(0x1111, 0x2222);
    assert_eq!(w.lo(), 0x1111);
    assert_eq!(w.hi(), 0x2222);
    assert!(w.bit(64 + 1));
    assert!(!w.bit(128));
}

#[test]
fn test_field_set_spanning_halves() {
    let mut w = SramWord::ZERO;
    w.set(60, 8, 0xab);
    assert_eq!(w.get(60, 8), 0xab);
    assert_eq!(w.lo() >> 60, 0xb);
    assert_eq!(w.hi(), 0xa);
}

#[test]
fn test_set_keeps_neighbours() {
    let mut w = SramWord::new(u128::MAX);
    w.set(8, 4, 0);
    assert_eq!(w.get(0, 8), 0xff);
    assert_eq!(w.get(8, 4), 0);
    assert_eq!(w.get(12, 8), 0xff);
}

#[test]
fn test_set_above_width_is_ignored() {
    let mut v = BitVector::<11>::ZERO;
    v.set(11, 4, 0xf);
    assert_eq!(v, BitVector::<11>::ZERO);
}

#[test]
fn test_signed_field() {
    let mut w = SramWord::ZERO;
    w.set_signed(77, 23, -5);
    assert_eq!(w.get_signed(77, 23), -5);
    assert_eq!(w.get(77, 23), 0x7f_fffb);
}

proptest! {
    #[test]
    fn prop_field_round_trip(lsb in 0u32..100, width in 1u32..=28, value in any::<u64>()) {
        let mut w = SramWord::ZERO;
        w.set(lsb, width, value);
        prop_assert_eq!(w.get(lsb, width), value & mask64(width));
    }
}
