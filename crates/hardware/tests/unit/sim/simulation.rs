//! # Simulation Context Tests
//!
//! Drives the model through its driver-facing entry points: bus routing, the
//! fault latch, atomic batches, timed sweeps and reset.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use rmt_model::Simulation;
use rmt_model::common::{BfStatus, PhysMemType, make_phys_address, make_reg_address};
use rmt_model::config::Config;
use rmt_model::mau::addr_dist::Eviction;
use rmt_model::mau::idletime::IdleConfig;
use rmt_model::mau::instr::{Instr, LockKind};
use rmt_model::mau::mapram::{MapramConfig, MapramType};
use rmt_model::mau::meter::{Color, MeterAluConfig, MeterKind};
use rmt_model::mau::moveregs::{AddrXform, MoveregsConfig};
use rmt_model::mau::registers::RegBlock;
use rmt_model::mau::sram::MatchFormat;
use rmt_model::mau::{InstrEffect, Notification};

use crate::common::harness::{
    bind_mapram, bind_meter_alu, exact_slot, init_tracing, mapram_index, match_table, phys_read, set_moveregs,
    test_sim, write_entry,
};

fn reg(block: RegBlock, index: u32) -> rmt_model::common::Address {
    make_reg_address(0, 0, block.code(), index)
}

// ══════════════════════════════════════════════════════════
// 1. Bus routing
// ══════════════════════════════════════════════════════════

#[test]
fn test_register_round_trip() {
    let sim = test_sim();
    sim.model_reg_write(reg(RegBlock::Scratch, 1), 0xabc).unwrap();
    assert_eq!(sim.model_reg_read(reg(RegBlock::Scratch, 1)), Ok(0xabc));
    // stage 1 has its own registers
    assert_eq!(sim.model_reg_read(make_reg_address(0, 1, RegBlock::Scratch.code(), 1)), Ok(0));
}

#[test]
fn test_register_call_rejects_memory_address() {
    let sim = test_sim();
    let addr = make_phys_address(0, 0, PhysMemType::Sram, 0, 0, 0);
    assert_eq!(sim.model_reg_read(addr), Err(BfStatus::InvalidArg));
    assert!(!sim.is_faulted());
}

#[test]
fn test_missing_stage_is_invalid_argument() {
    let sim = test_sim();
    assert_eq!(sim.instr_handle(0, 5, Instr::Nop.encode(), 0, 0), Err(BfStatus::InvalidArg));
    assert_eq!(sim.instr_handle(3, 0, Instr::Nop.encode(), 0, 0), Err(BfStatus::InvalidArg));
    assert!(sim.lock_resources(0, 2).is_none());
    assert!(!sim.is_faulted());
}

#[test]
fn test_indirect_memory_round_trip() {
    let sim = test_sim();
    let addr = make_phys_address(0, 1, PhysMemType::Sram, 3, 4, 100);
    sim.model_ind_write(addr, 7, 8).unwrap();
    assert_eq!(sim.model_ind_read(addr), Ok((7, 8)));
}

#[test]
fn test_failed_indirect_write_is_invalid_argument() {
    let sim = test_sim();
    let addr = make_phys_address(0, 0, PhysMemType::Sram, 9, 0, 0);
    assert_eq!(sim.model_ind_write(addr, 1, 1), Err(BfStatus::InvalidArg));
}

#[test]
fn test_indirect_write_to_instruction_address() {
    let sim = test_sim();
    let barrier = Instr::BarrierLock {
        kind: LockKind::LockStats,
        lt: 2,
        id: 5,
    };
    sim.model_ind_write(Simulation::instr_address(0, 1, barrier), 0, 0).unwrap();
    assert_eq!(
        sim.drain_notifications(),
        vec![(
            0,
            1,
            Notification::BarrierAck {
                kind: LockKind::LockStats,
                lt: 2,
                id: 5
            }
        )]
    );
    let refused = rmt_model::common::make_instr_address(0, 0, 9 << 22);
    assert_eq!(sim.model_ind_write(refused, 0, 0), Err(BfStatus::InvalidArg));
}

#[test]
fn test_tcam_writereg_and_flush() {
    let sim = test_sim();
    sim.model_set_tcam_writereg(0, 0, 1, 0, 10, 0x1, 0x2).unwrap();
    sim.model_set_tcam_writereg(0, 1, 2, 1, 11, 0x3, 0x4).unwrap();
    assert_eq!(sim.flush_all_tcam_writeregs(), Ok(2));
    assert_eq!(sim.flush_all_tcam_writeregs(), Ok(0));
    assert_eq!(
        sim.model_set_tcam_writereg(0, 0, 99, 0, 0, 0, 0),
        Err(BfStatus::InvalidArg)
    );
}

#[test]
fn test_exact_match_lookup() {
    let sim = test_sim();
    let slot = exact_slot(0, 0);
    {
        let mut mau = sim.lock_resources(0, 1).unwrap();
        let format = MatchFormat {
            slots: vec![slot],
            default_next_table: 0,
        };
        match_table(&mut mau, 4, 2, 2, format);
        write_entry(&mut mau, 2, 2, 17, &slot, 0x5555, 6, 0x99);
    }
    let (hit, imm) = sim.exact_match_lookup(0, 1, 4, 17, 0x5555).unwrap().unwrap();
    assert_eq!((hit.next_table, imm), (6, Some(0x99)));
    assert_eq!(sim.exact_match_lookup(0, 0, 4, 17, 0x5555), Ok(None));
    assert_eq!(sim.stats().sram_hits, 1);
}

// ══════════════════════════════════════════════════════════
// 2. Fault latch
// ══════════════════════════════════════════════════════════

#[test]
fn test_fatal_error_latches() {
    let mut sim = test_sim();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    sim.set_fatal_hook(Box::new(move |_| {
        let _ = seen.fetch_add(1, Ordering::SeqCst);
    }));

    // address 5 is the MISS address of table 2
    sim.model_reg_write(reg(RegBlock::MissAddress, 2), (1 << 23) | 5).unwrap();
    let push = Instr::PushMove { lt: 2 }.encode();
    assert_eq!(sim.instr_handle(0, 0, push, 5, 0), Err(BfStatus::Unexpected));
    assert!(sim.is_faulted());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(sim.model_reg_read(reg(RegBlock::Scratch, 0)), Err(BfStatus::NotReady));
    assert_eq!(sim.time_increment(10), Err(BfStatus::NotReady));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let log = sim.event_log();
    let last = log.lines().last().unwrap();
    assert!(last.contains(r#""event":"fatal""#));
    assert!(last.contains(r#""op":"instr_handle""#));
}

#[test]
fn test_reset_clears_fault() {
    let sim = test_sim();
    sim.model_reg_write(reg(RegBlock::MissAddress, 2), (1 << 23) | 5).unwrap();
    let _ = sim.instr_handle(0, 0, Instr::PushMove { lt: 2 }.encode(), 5, 0);
    assert!(sim.is_faulted());

    sim.reset();
    assert!(!sim.is_faulted());
    assert!(sim.event_log().lines().is_empty());
    // the MISS register was reset with the stage
    assert_eq!(
        sim.instr_handle(0, 0, Instr::PushMove { lt: 2 }.encode(), 5, 0),
        Ok(InstrEffect::Done)
    );
}

#[test]
fn test_shutdown_refuses_calls() {
    let sim = test_sim();
    sim.shutdown();
    assert_eq!(sim.instr_handle(0, 0, Instr::Nop.encode(), 0, 0), Err(BfStatus::NotReady));
    assert!(!sim.is_faulted());
    sim.reset();
    assert_eq!(sim.instr_handle(0, 0, Instr::Nop.encode(), 0, 0), Ok(InstrEffect::Done));
}

// ══════════════════════════════════════════════════════════
// 3. Atomic batches
// ══════════════════════════════════════════════════════════

#[test]
fn test_atomic_batch_applies_at_commit() {
    let sim = test_sim();
    let init = Instr::Init { set_meter_time: true }.encode();
    sim.atomic_begin(0, 0).unwrap();
    sim.atomic_instr(0, 0, init, 10, 0).unwrap();
    sim.atomic_instr(0, 0, init, 20, 0).unwrap();
    // other stages keep running directly
    sim.atomic_instr(0, 1, init, 30, 0).unwrap();
    assert_eq!(sim.lock_resources(0, 0).unwrap().meter_time(), 0);
    assert_eq!(sim.lock_resources(0, 1).unwrap().meter_time(), 30);

    assert_eq!(sim.atomic_commit(0, 0), Ok(2));
    assert_eq!(sim.lock_resources(0, 0).unwrap().meter_time(), 20);
    assert_eq!(sim.atomic_commit(0, 0), Ok(0));
}

#[test]
fn test_meter_time_regression_flushes_whole_pipe() {
    let sim = test_sim();
    {
        let mut mau = sim.lock_resources(0, 1).unwrap();
        bind_meter_alu(
            &mut mau,
            0,
            MeterAluConfig {
                lt: Some(3),
                kind: MeterKind::Bucket,
                fractional_bits: 0,
                byte_mode: false,
            },
        );
        bind_mapram(&mut mau, 0, 0, 3, 0, MapramType::Meter);
        bind_mapram(&mut mau, 0, 1, 3, 0, MapramType::Color);
        set_moveregs(
            &mut mau,
            3,
            MoveregsConfig {
                meter: Some(AddrXform { shift: 0, width: 10 }),
                ..MoveregsConfig::default()
            },
        );
        mau.process_hit(3, 8, 64, Color::Red, 1);
        mau.handle_eop(1, 0).unwrap();
    }
    let init = Instr::Init { set_meter_time: true }.encode();
    assert_eq!(sim.instr_handle(0, 0, init, 100, 0), Ok(InstrEffect::Done));
    assert_eq!(sim.instr_handle(0, 0, init, 50, 0), Ok(InstrEffect::FlushPipeColors));

    let mut mau = sim.lock_resources(0, 1).unwrap();
    let code = u64::from(Color::Red.code().unwrap());
    assert_eq!(phys_read(&mut mau, PhysMemType::Mapram, 0, 1, 8), (code, 0));
}

// ══════════════════════════════════════════════════════════
// 4. Time and sweeps
// ══════════════════════════════════════════════════════════

fn swept_sim() -> Simulation {
    init_tracing();
    let config = Config::from_json_str(
        r#"{
            "chip": {"pipes": 1, "stages": 2},
            "sweep": {"idle_interval": 100},
            "log": {"event_log": true}
        }"#,
    )
    .unwrap();
    Simulation::new(&config).unwrap()
}

#[test]
fn test_time_increment_runs_due_sweeps() {
    let sim = swept_sim();
    sim.time_increment(250).unwrap();
    assert_eq!(sim.time(), 250);
    let log = sim.event_log();
    let tasks: Vec<&String> = log.lines().iter().filter(|l| l.contains(r#""event":"task""#)).collect();
    assert_eq!(
        tasks,
        [
            r#"{"event":"task","time":100,"task":"idle_sweep"}"#,
            r#"{"event":"task","time":200,"task":"idle_sweep"}"#,
        ]
    );
}

#[test]
fn test_idle_sweep_reports_evictions() {
    let sim = swept_sim();
    let idle = IdleConfig { width: 1, enable: true };
    let mapram = MapramConfig {
        self_type: MapramType::Idletime,
        vpn: 0,
        lt: 6,
        enable: true,
    };
    let index = mapram_index(&sim.lock_resources(0, 1).unwrap(), 0, 0);
    sim.model_reg_write(make_reg_address(0, 1, RegBlock::IdletimeConfig.code(), 6), idle.pack())
        .unwrap();
    sim.model_reg_write(make_reg_address(0, 1, RegBlock::MapramConfig.code(), index), mapram.pack())
        .unwrap();
    // every word but the first is already idle
    for word in 1..sim.chip().sram_entries as u32 {
        let addr = make_phys_address(0, 1, PhysMemType::Mapram, 0, 0, word);
        sim.model_ind_write(addr, 0xff, 0).unwrap();
    }
    let addr = make_phys_address(0, 1, PhysMemType::Mapram, 0, 0, 0);
    sim.model_ind_write(addr, 0xfe, 0).unwrap();

    sim.time_increment(100).unwrap();
    assert_eq!(sim.take_evictions(), vec![(0, 1, Eviction { lt: 6, addr: 0 })]);
    assert_eq!(sim.stats().idle_timeouts, 1);
}

#[test]
fn test_time_saturates_at_end_of_time() {
    let sim = test_sim();
    sim.schedule(u64::MAX, rmt_model::sim::Task::MeterSweep);
    sim.time_increment(u64::MAX - 5).unwrap();
    sim.time_increment(10).unwrap();
    assert_eq!(sim.time(), u64::MAX);
    sim.time_increment(1).unwrap();
    assert_eq!(sim.time(), u64::MAX);
    let sweeps = sim.event_log().lines().iter().filter(|l| l.contains("meter_sweep")).count();
    assert_eq!(sweeps, 1);
}

#[test]
fn test_one_shot_task() {
    let sim = test_sim();
    sim.schedule(40, rmt_model::sim::Task::MeterSweep);
    sim.time_increment(39).unwrap();
    assert!(!sim.event_log().lines().iter().any(|l| l.contains("meter_sweep")));
    sim.time_increment(1).unwrap();
    assert!(sim.event_log().lines().iter().any(|l| l.contains("meter_sweep")));
}
