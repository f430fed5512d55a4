//! # Token-Bucket Meter Tests
//!
//! Drives `MauMeter::calculate_output` directly on hand-built meter words. Covers
//! crediting in both timing modes, saturation snapping, coloring and debiting,
//! sweeps, and the forward cache.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rmt_model::common::SramWord;
use rmt_model::mau::meter::{
    Bucket, BucketConfig, Color, ForwardCache, MauMeter, MeterInput, MeterState,
};

const LEVEL_WIDTH: u32 = 23;
const TS_WIDTH: u32 = 28;

fn bucket(level: i64, rate_mant: u64, rate_exp: u32, burst_mant: u64, burst_exp: u32) -> Bucket {
    Bucket {
        level,
        cfg: BucketConfig {
            rate_mant,
            rate_exp,
            burst_mant,
            burst_exp,
        },
    }
}

fn word(committed: Bucket, peak: Bucket, timestamp: u64) -> SramWord {
    MeterState {
        committed,
        peak,
        timestamp,
    }
    .pack()
}

fn access(data_in: SramWord, now: u64, decrement: u64) -> MeterInput {
    MeterInput {
        vaddr: 0x40,
        data_in,
        present_time: now,
        decrement,
        ..MeterInput::default()
    }
}

fn levels(out: &SramWord) -> (i64, i64, u64) {
    let st = MeterState::unpack(out);
    (st.committed.level, st.peak.level, st.timestamp)
}

// ══════════════════════════════════════════════════════════
// 1. Encoding
// ══════════════════════════════════════════════════════════

#[test]
fn test_state_pack_unpack() {
    let st = MeterState {
        committed: bucket(-1234, 511, 31, 255, 7),
        peak: bucket(4_000_000, 3, 2, 1, 0),
        timestamp: (1 << 28) - 1,
    };
    assert_eq!(MeterState::unpack(&st.pack()), st);
}

#[test]
fn test_burst_size_clamps_to_level_range() {
    assert_eq!(bucket(0, 0, 0, 100, 3).cfg.burst_size(LEVEL_WIDTH), 800);
    assert_eq!(bucket(0, 0, 0, 255, 31).cfg.burst_size(LEVEL_WIDTH), (1 << 22) - 1);
}

#[test]
fn test_wide_level_width_clamped_to_field() {
    let field_max = (1i64 << 22) - 1;
    assert_eq!(bucket(0, 0, 0, 255, 31).cfg.burst_size(LEVEL_WIDTH + 1), field_max);

    let mut meter = MauMeter::new(LEVEL_WIDTH + 1, TS_WIDTH, false);
    let data = word(bucket(0, 255, 0, 255, 31), bucket(0, 255, 0, 255, 31), 0);
    let out = meter.calculate_output(&access(data, 1 << 20, 10)).unwrap();
    assert!(out.committed_saturated && out.peak_saturated);
    assert_eq!(out.color_out, Color::Green);
    assert_eq!(levels(&out.data_out), (field_max - 10, field_max - 10, 1 << 20));

    // the stored level is still positive, so the next packet stays green
    let next = meter.calculate_output(&access(out.data_out, 1 << 20, 10)).unwrap();
    assert_eq!(next.color_out, Color::Green);
}

#[test]
fn test_zero_level_width_does_not_underflow() {
    let mut meter = MauMeter::new(0, TS_WIDTH, false);
    let data = word(bucket(0, 1, 0, 1, 0), bucket(0, 1, 0, 1, 0), 0);
    let out = meter.calculate_output(&access(data, 100, 5)).unwrap();
    assert_eq!(out.color_out, Color::Green);
    assert_eq!(levels(&out.data_out), (0, 0, 100));
}

#[test]
fn test_color_ordering() {
    assert_eq!(Color::Green.worse(Color::Yellow), Color::Yellow);
    assert_eq!(Color::Red.worse(Color::Yellow), Color::Red);
    assert_eq!(Color::Inhibit.worse(Color::Green), Color::Inhibit);
    assert_eq!(Color::from_levels(-1, 5), Color::Yellow);
    assert_eq!(Color::from_levels(5, -1), Color::Red);
    assert_eq!(Color::from_code(Color::Red.code().unwrap()), Color::Red);
    assert_eq!(Color::Inhibit.code(), None);
}

// ══════════════════════════════════════════════════════════
// 2. Crediting
// ══════════════════════════════════════════════════════════

#[test]
fn test_coupled_saturation_snaps_timestamp() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, true);
    let data = word(bucket(0, 10, 0, 100, 0), bucket(0, 20, 0, 200, 0), 0);

    let out = meter.calculate_output(&access(data, 1000, 50)).unwrap();
    assert!(out.committed_saturated && out.peak_saturated);
    assert!(out.snapped);
    assert_eq!(out.color_out, Color::Green);
    assert_eq!(levels(&out.data_out), (50, 150, 1000));
    assert_eq!(meter.snap_vaddr(), Some(0x40));

    // the access right after a snap on the same meter earns no credit
    let again = meter.calculate_output(&access(out.data_out, 5000, 10)).unwrap();
    assert!(again.credit_skipped);
    assert_eq!(levels(&again.data_out), (40, 140, 1000));
    assert_eq!(meter.snap_vaddr(), None);
}

#[test]
fn test_snap_consumed_by_other_meter() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, true);
    let data = word(bucket(0, 10, 0, 100, 0), bucket(0, 20, 0, 200, 0), 0);
    let _ = meter.calculate_output(&access(data, 1000, 0)).unwrap();

    let mut other = access(data, 1000, 0);
    other.vaddr = 0x41;
    assert!(!meter.calculate_output(&other).unwrap().credit_skipped);
    assert_eq!(meter.snap_vaddr(), None);
}

#[test]
fn test_coupled_ticks_use_coarser_exponent() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, true);
    let data = word(bucket(0, 1, 4, 255, 10), bucket(0, 1, 2, 255, 10), 0);
    let mut input = access(data, 37, 0);
    input.meter_sweep = true;

    let out = meter.calculate_output(&input).unwrap();
    // two ticks of 16 cycles; peak credit scaled by 2^(4 - 2)
    assert_eq!(levels(&out.data_out), (2, 8, 32));
    assert!(!out.snapped);
}

#[test]
fn test_decoupled_ticks_per_bucket() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(0, 1, 4, 255, 10), bucket(0, 1, 2, 255, 10), 0);
    let mut input = access(data, 37, 0);
    input.meter_sweep = true;

    let out = meter.calculate_output(&input).unwrap();
    assert_eq!(levels(&out.data_out), (2, 9, 37));
}

#[test]
fn test_decoupled_saturation_does_not_snap() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(0, 10, 0, 100, 0), bucket(0, 20, 0, 200, 0), 0);
    let out = meter.calculate_output(&access(data, 1000, 0)).unwrap();
    assert!(out.committed_saturated && out.peak_saturated);
    assert!(!out.snapped);
    assert_eq!(meter.snap_vaddr(), None);
}

#[test]
fn test_timestamp_wraps() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(0, 1, 0, 255, 10), bucket(0, 1, 0, 255, 10), (1 << 28) - 5);
    let out = meter.calculate_output(&access(data, 5, 0)).unwrap();
    // five cycles to the wrap, five after
    assert_eq!(levels(&out.data_out).0, 10);
}

#[test]
fn test_relative_time_adds_to_present_time() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(0, 1, 0, 255, 10), bucket(0, 1, 0, 255, 10), 0);
    let mut input = access(data, 100, 0);
    input.relative_time = 20;
    let out = meter.calculate_output(&input).unwrap();
    assert_eq!(levels(&out.data_out), (120, 120, 120));
}

// ══════════════════════════════════════════════════════════
// 3. Coloring and debits
// ══════════════════════════════════════════════════════════

#[test]
fn test_sweep_credits_without_debit() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(10, 1, 0, 255, 10), bucket(10, 1, 0, 255, 10), 0);
    let mut input = access(data, 5, 1000);
    input.meter_sweep = true;
    let out = meter.calculate_output(&input).unwrap();
    assert_eq!(out.color_out, Color::Inhibit);
    assert_eq!(levels(&out.data_out), (15, 15, 5));
}

#[test]
fn test_yellow_debits_peak_only() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(-10, 0, 0, 255, 10), bucket(100, 0, 0, 255, 10), 0);
    let out = meter.calculate_output(&access(data, 0, 5)).unwrap();
    assert_eq!(out.color_out, Color::Yellow);
    assert_eq!(levels(&out.data_out).0, -10);
    assert_eq!(levels(&out.data_out).1, 95);
}

#[test]
fn test_red_debits_nothing() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(50, 0, 0, 255, 10), bucket(-1, 0, 0, 255, 10), 0);
    let out = meter.calculate_output(&access(data, 0, 5)).unwrap();
    assert_eq!(out.color_out, Color::Red);
    assert_eq!((levels(&out.data_out).0, levels(&out.data_out).1), (50, -1));
}

#[test]
fn test_incoming_color_is_never_improved() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(50, 0, 0, 255, 10), bucket(50, 0, 0, 255, 10), 0);
    let mut input = access(data, 0, 5);
    input.color_in = Color::Yellow;
    let out = meter.calculate_output(&input).unwrap();
    assert_eq!(out.color_out, Color::Yellow);
    assert_eq!((levels(&out.data_out).0, levels(&out.data_out).1), (50, 45));
}

#[test]
fn test_green_debits_both_into_negative() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    let data = word(bucket(10, 0, 0, 255, 10), bucket(20, 0, 0, 255, 10), 0);
    let out = meter.calculate_output(&access(data, 0, 15)).unwrap();
    assert_eq!(out.color_out, Color::Green);
    assert_eq!((levels(&out.data_out).0, levels(&out.data_out).1), (-5, 5));
}

#[test]
fn test_fractional_credit_rounds_with_random() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, false);
    meter.set_fractional_bits(1);
    // one tick at rate 1 with one fractional bit is half a token
    let data = word(bucket(0, 1, 0, 255, 10), bucket(0, 1, 0, 255, 10), 0);
    let mut input = access(data, 1, 0);
    input.meter_sweep = true;
    input.rng_enable = true;

    input.random = 0;
    assert_eq!(levels(&meter.calculate_output(&input).unwrap().data_out).0, 1);
    input.random = 1;
    assert_eq!(levels(&meter.calculate_output(&input).unwrap().data_out).0, 0);
}

proptest! {
    #[test]
    fn prop_levels_stay_in_range(
        c_level in -1000i64..1000,
        p_level in -1000i64..1000,
        c_rate in 0u64..512,
        p_rate in 0u64..512,
        c_burst in 0u64..256,
        p_burst in 0u64..256,
        ts in 0u64..(1 << 28),
        now in 0u64..(1 << 28),
        decrement in 0u64..(1 << 24),
        coupled in any::<bool>(),
    ) {
        let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, coupled);
        let committed = bucket(c_level, c_rate, 3, c_burst, 4);
        let peak = bucket(p_level, p_rate, 1, p_burst, 4);
        let out = meter
            .calculate_output(&access(word(committed, peak, ts), now, decrement))
            .unwrap();
        let (c, p, _) = levels(&out.data_out);
        let floor = -(1i64 << 22);
        prop_assert!(c >= floor && c <= committed.cfg.burst_size(LEVEL_WIDTH).max(c_level));
        prop_assert!(p >= floor && p <= peak.cfg.burst_size(LEVEL_WIDTH).max(p_level));
    }
}

// ══════════════════════════════════════════════════════════
// 4. Forward cache
// ══════════════════════════════════════════════════════════

#[test]
fn test_forward_cache_replays_once() {
    let old = SramWord::from_words(1, 2);
    let new = SramWord::from_words(3, 4);
    let mut cache = ForwardCache::default();
    cache.store(9, old);
    assert_eq!(cache.vaddr(), Some(9));
    assert_eq!(cache.take_for(9, new), old);
    assert_eq!(cache.take_for(9, new), new);
}

#[test]
fn test_forward_cache_other_address_clears() {
    let mut cache = ForwardCache::default();
    cache.store(9, SramWord::from_words(1, 0));
    let ram = SramWord::from_words(7, 0);
    assert_eq!(cache.take_for(10, ram), ram);
    assert_eq!(cache.vaddr(), None);
}

#[test]
fn test_forward_cache_follows_move() {
    let mut cache = ForwardCache::default();
    cache.store(9, SramWord::from_words(1, 0));
    cache.retarget(9, Some(4));
    assert_eq!(cache.vaddr(), Some(4));
    cache.retarget(4, None);
    assert_eq!(cache.vaddr(), None);
}

#[test]
fn test_snap_follows_move() {
    let mut meter = MauMeter::new(LEVEL_WIDTH, TS_WIDTH, true);
    let data = word(bucket(0, 10, 0, 100, 0), bucket(0, 20, 0, 200, 0), 0);
    let _ = meter.calculate_output(&access(data, 1000, 0)).unwrap();
    meter.update_addresses(Some(0x40), Some(0x80));
    assert_eq!(meter.snap_vaddr(), Some(0x80));
}
