//! # Datapath Tests
//!
//! Packet-side behaviour of a stage: deferred stats and meter updates at
//! end-of-packet, idle aging, the color write queue and multi-column lookups.

use pretty_assertions::assert_eq;
use rmt_model::Mau;
use rmt_model::common::{PhysMemType, SramWord, VirtMemType};
use rmt_model::mau::addr_dist::Eviction;
use rmt_model::mau::idletime::IdleConfig;
use rmt_model::mau::instr::Instr;
use rmt_model::mau::mapram::MapramType;
use rmt_model::mau::meter::{Bucket, BucketConfig, Color, MeterAluConfig, MeterKind, MeterState};
use rmt_model::mau::moveregs::{AddrXform, MoveregsConfig};
use rmt_model::mau::sram::MatchFormat;
use rmt_model::mau::InstrEffect;
use rmt_model::mau::stats::StatsEntry;

use crate::common::harness::{
    bind_mapram, bind_meter_alu, exact_slot, match_table, phys_read, phys_write, set_idletime, set_moveregs, stage,
    virt_read, virt_write, write_entry,
};

const XF: AddrXform = AddrXform { shift: 0, width: 12 };

fn stats_table(mau: &mut Mau, lt: u8) {
    bind_mapram(mau, 1, 3, lt, 0, MapramType::Stats);
    set_moveregs(
        mau,
        lt,
        MoveregsConfig {
            stats: Some(XF),
            ..MoveregsConfig::default()
        },
    );
}

fn meter_table(mau: &mut Mau, lt: u8) {
    bind_meter_alu(
        mau,
        0,
        MeterAluConfig {
            lt: Some(lt),
            kind: MeterKind::Bucket,
            fractional_bits: 0,
            byte_mode: false,
        },
    );
    bind_mapram(mau, 2, 0, lt, 0, MapramType::Meter);
    bind_mapram(mau, 2, 1, lt, 0, MapramType::Color);
    set_moveregs(
        mau,
        lt,
        MoveregsConfig {
            meter: Some(XF),
            ..MoveregsConfig::default()
        },
    );
}

fn full_buckets(level: i64) -> SramWord {
    let bucket = Bucket {
        level,
        cfg: BucketConfig {
            rate_mant: 0,
            rate_exp: 0,
            burst_mant: 255,
            burst_exp: 10,
        },
    };
    MeterState {
        committed: bucket,
        peak: bucket,
        timestamp: 0,
    }
    .pack()
}

// ══════════════════════════════════════════════════════════
// 1. Deferred stats
// ══════════════════════════════════════════════════════════

#[test]
fn test_stats_applied_at_eop() {
    let mut mau = stage();
    stats_table(&mut mau, 2);

    mau.process_hit(2, 12, 100, Color::Green, 7);
    assert_eq!(virt_read(&mut mau, VirtMemType::Stats, 2, 12), SramWord::ZERO);

    mau.handle_eop(6, 0).unwrap();
    assert_eq!(mau.stats().stats_updates, 0);

    mau.handle_eop(7, 0).unwrap();
    let entry = StatsEntry::from_word(&virt_read(&mut mau, VirtMemType::Stats, 2, 12));
    assert_eq!(entry, StatsEntry::new(1, 100));
    assert_eq!(mau.stats().stats_updates, 1);
}

#[test]
fn test_stats_accumulate() {
    let mut mau = stage();
    stats_table(&mut mau, 2);
    for eop in 0..3 {
        mau.process_hit(2, 4, 64, Color::Green, eop);
        mau.handle_eop(eop, 0).unwrap();
    }
    let entry = StatsEntry::from_word(&virt_read(&mut mau, VirtMemType::Stats, 2, 4));
    assert_eq!(entry, StatsEntry::new(3, 192));
}

#[test]
fn test_stats_on_unmapped_page_not_counted() {
    let mut mau = stage();
    stats_table(&mut mau, 2);
    // vpn 1 has no stats mapram
    mau.process_hit(2, 2000, 100, Color::Green, 1);
    mau.handle_eop(1, 0).unwrap();
    assert_eq!(mau.stats().stats_updates, 0);
    assert_eq!(virt_read(&mut mau, VirtMemType::Stats, 2, 2000 % 1024), SramWord::ZERO);
}

#[test]
fn test_table_without_stats_defers_nothing() {
    let mut mau = stage();
    bind_mapram(&mut mau, 1, 3, 2, 0, MapramType::Stats);
    mau.process_hit(2, 12, 100, Color::Green, 1);
    mau.handle_eop(1, 0).unwrap();
    assert_eq!(mau.stats().stats_updates, 0);
}

#[test]
fn test_pending_eop_blocks_table_move() {
    let mut mau = stage();
    stats_table(&mut mau, 2);
    mau.process_hit(2, 12, 100, Color::Green, 7);

    let push = Instr::PushMove { lt: 2 }.encode();
    assert_eq!(mau.instr_handle(push, 12, 0, 0).unwrap(), InstrEffect::Refused);
    // other tables are unaffected
    assert_eq!(
        mau.instr_handle(Instr::PushMove { lt: 3 }.encode(), 1, 0, 0).unwrap(),
        InstrEffect::Done
    );

    mau.handle_eop(7, 0).unwrap();
    assert_eq!(mau.instr_handle(push, 12, 0, 0).unwrap(), InstrEffect::Done);
}

// ══════════════════════════════════════════════════════════
// 2. Idletime
// ══════════════════════════════════════════════════════════

#[test]
fn test_idle_sweep_queues_eviction() {
    let mut mau = stage();
    set_idletime(&mut mau, 5, IdleConfig { width: 2, enable: true });
    bind_mapram(&mut mau, 0, 1, 5, 0, MapramType::Idletime);
    // entry 30 lives in word 7, sub-entry 2, one sweep from idle
    phys_write(&mut mau, PhysMemType::Mapram, 0, 1, 7, 0x20, 0);

    mau.idle_sweep(None);
    assert_eq!(mau.take_evictions(), vec![Eviction { lt: 5, addr: 30 }]);
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 0, 1, 7), (0x75, 0));
    assert_eq!(mau.stats().idle_timeouts, 1);
    assert!(mau.take_evictions().is_empty());
}

#[test]
fn test_idle_sweep_single_table() {
    let mut mau = stage();
    set_idletime(&mut mau, 5, IdleConfig { width: 1, enable: true });
    bind_mapram(&mut mau, 0, 1, 5, 0, MapramType::Idletime);

    mau.idle_sweep(Some(6));
    assert!(mau.take_evictions().is_empty());
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 0, 1, 0), (0, 0));
}

#[test]
fn test_hit_refreshes_idle_entry() {
    let mut mau = stage();
    set_idletime(&mut mau, 5, IdleConfig { width: 2, enable: true });
    bind_mapram(&mut mau, 0, 1, 5, 0, MapramType::Idletime);
    set_moveregs(
        &mut mau,
        5,
        MoveregsConfig {
            idle: Some(XF),
            ..MoveregsConfig::default()
        },
    );
    phys_write(&mut mau, PhysMemType::Mapram, 0, 1, 7, 0x75, 0);

    mau.process_hit(5, 30, 64, Color::Green, 0);
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 0, 1, 7), (0x45, 0));
}

// ══════════════════════════════════════════════════════════
// 3. Meters and colors
// ══════════════════════════════════════════════════════════

#[test]
fn test_run_meter_writes_back() {
    let mut mau = stage();
    meter_table(&mut mau, 4);
    virt_write(&mut mau, VirtMemType::Meter, 4, 5, full_buckets(100));

    let color = mau.run_meter(4, 5, 0, Color::Green, 0, false).unwrap();
    assert_eq!(color, Some(Color::Green));
    let st = MeterState::unpack(&virt_read(&mut mau, VirtMemType::Meter, 4, 5));
    assert_eq!((st.committed.level, st.peak.level), (99, 99));
    assert_eq!(mau.stats().meter_updates, 1);
}

#[test]
fn test_run_meter_without_alu() {
    let mut mau = stage();
    bind_mapram(&mut mau, 2, 0, 4, 0, MapramType::Meter);
    assert_eq!(mau.run_meter(4, 5, 0, Color::Green, 0, false).unwrap(), None);
    meter_table(&mut mau, 4);
    // bound ALU but the address has no meter mapram
    assert_eq!(mau.run_meter(4, 5000, 0, Color::Green, 0, false).unwrap(), None);
    assert_eq!(mau.stats().meter_updates, 0);
}

#[test]
fn test_eop_meter_color_reaches_color_mapram() {
    let mut mau = stage();
    meter_table(&mut mau, 4);
    virt_write(&mut mau, VirtMemType::Meter, 4, 5, full_buckets(100));

    mau.process_hit(4, 5, 64, Color::Red, 3);
    mau.handle_eop(3, 0).unwrap();
    assert_eq!(mau.stats().meter_red, 1);
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 2, 1, 5), (0, 0));

    assert_eq!(mau.flush_color_queue(), 1);
    let code = u64::from(Color::Red.code().unwrap());
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 2, 1, 5), (code, 0));
    assert_eq!(mau.flush_color_queue(), 0);
}

#[test]
fn test_meter_sweep_credits_without_debit() {
    let mut mau = stage();
    meter_table(&mut mau, 4);
    virt_write(&mut mau, VirtMemType::Meter, 4, 5, full_buckets(100));

    mau.meter_sweep(0).unwrap();
    let st = MeterState::unpack(&virt_read(&mut mau, VirtMemType::Meter, 4, 5));
    assert_eq!((st.committed.level, st.peak.level), (100, 100));
    // only the non-zero word was visited
    assert_eq!(mau.stats().meter_updates, 1);
}

// ══════════════════════════════════════════════════════════
// 4. Multi-column lookup
// ══════════════════════════════════════════════════════════

#[test]
fn test_lookup_across_columns() {
    let mut mau = stage();
    let slot = exact_slot(0, 0);
    let format = || MatchFormat {
        slots: vec![slot],
        default_next_table: 0,
    };
    match_table(&mut mau, 1, 0, 2, format());
    match_table(&mut mau, 1, 0, 5, format());
    write_entry(&mut mau, 0, 5, 9, &slot, 0xabcd, 3, 0x11);

    let hit = mau.sram_lookup(1, 9, 0xabcd).unwrap().unwrap();
    assert_eq!((hit.col, hit.next_table), (5, 3));
    assert_eq!(mau.hit_imm_data(&hit), Some(0x11));
    assert_eq!(mau.sram_lookup(1, 9, 0xabce).unwrap(), None);
    assert_eq!(mau.stats().sram_lookups, 2);
    assert_eq!(mau.stats().sram_hits, 1);
}

// ══════════════════════════════════════════════════════════
// 5. Moves in flight
// ══════════════════════════════════════════════════════════

#[test]
fn test_moved_address_in_flight_until_next_pop() {
    let mut mau = stage();
    let pop = Instr::PopMove {
        lt: 3,
        stats_init: false,
        idle_init: false,
    }
    .encode();

    assert_eq!(mau.instr_handle(Instr::PushMove { lt: 3 }.encode(), 0x40, 0, 0).unwrap(), InstrEffect::Done);
    assert_eq!(mau.resources().addr_dist().in_flight(3), None);

    assert_eq!(mau.instr_handle(pop, 0, 0, 0).unwrap(), InstrEffect::Done);
    assert_eq!(mau.resources().addr_dist().in_flight(3), Some(0x40));
    assert_eq!(mau.resources().addr_dist().in_flight(2), None);

    assert_eq!(mau.instr_handle(pop, 0, 0, 0).unwrap(), InstrEffect::Done);
    assert_eq!(mau.resources().addr_dist().in_flight(3), None);
}

#[test]
fn test_queued_eviction_follows_move() {
    let mut mau = stage();
    set_idletime(&mut mau, 5, IdleConfig { width: 2, enable: true });
    bind_mapram(&mut mau, 0, 1, 5, 0, MapramType::Idletime);
    phys_write(&mut mau, PhysMemType::Mapram, 0, 1, 0, 0x2, 0);
    mau.idle_sweep(Some(5));

    // 0 moves to 9: push 9, push 0, pop reports (D=0, oldD=9)
    let push = Instr::PushMove { lt: 5 }.encode();
    assert_eq!(mau.instr_handle(push, 9, 0, 0).unwrap(), InstrEffect::Done);
    assert_eq!(mau.instr_handle(push, 0, 0, 0).unwrap(), InstrEffect::Done);
    let pop = Instr::PopMove {
        lt: 5,
        stats_init: false,
        idle_init: false,
    };
    assert_eq!(mau.instr_handle(pop.encode(), 0, 0, 0).unwrap(), InstrEffect::Done);
    assert_eq!(mau.take_evictions(), vec![Eviction { lt: 5, addr: 9 }]);
}
