//! # Instruction Word Tests

use pretty_assertions::assert_eq;
use rmt_model::mau::instr::{Instr, InstrError, LockKind};
use rstest::rstest;

#[rstest]
#[case(Instr::Nop)]
#[case(Instr::BarrierLock { kind: LockKind::Barrier, lt: 3, id: 0xbeef })]
#[case(Instr::BarrierLock { kind: LockKind::Unlock, lt: 15, id: 0 })]
#[case(Instr::PushMove { lt: 9 })]
#[case(Instr::PopMove { lt: 2, stats_init: true, idle_init: false })]
#[case(Instr::PopMove { lt: 2, stats_init: false, idle_init: true })]
#[case(Instr::Init { set_meter_time: true })]
#[case(Instr::DumpStatsWord { lt: 1, clear: true })]
#[case(Instr::DumpIdleWord { lt: 4, clear: false })]
#[case(Instr::DumpStatsTable { lt: 7, clear: false })]
#[case(Instr::DumpIdleTable { lt: 8, clear: true })]
#[case(Instr::PipeRing)]
#[case(Instr::SetTcamWritereg { row: 11, col: 1, index: 511 })]
#[case(Instr::TcamCopyWord { row: 3, col: 0, n: 32, top_to_bottom: true })]
#[case(Instr::RunStateful { lt: 6, instr: 7 })]
#[case(Instr::ChipExtension { payload: 0x15 })]
fn test_round_trip(#[case] instr: Instr) {
    let word = instr.encode();
    assert_eq!(word >> 28, 0);
    assert_eq!(Instr::decode(word), Ok(instr));
}

#[test]
fn test_too_wide_rejected() {
    assert_eq!(Instr::decode(1 << 28), Err(InstrError::TooWide(1 << 28)));
}

#[test]
fn test_reserved_opcode_rejected() {
    let word = 9 << 22;
    assert_eq!(Instr::decode(word), Err(InstrError::ReservedOpcode { word, opcode: 9 }));
    assert!(Instr::decode(word).unwrap_err().to_string().contains("reserved opcode 0x9"));
}

#[test]
fn test_known_words() {
    assert_eq!(Instr::decode(0), Ok(Instr::Nop));
    assert_eq!(Instr::PushMove { lt: 1 }.encode(), (2 << 22) | (1 << 16));
    assert_eq!(Instr::RunStateful { lt: 1, instr: 2 }.encode(), (0b10 << 26) | (1 << 22) | (2 << 19));
}

#[test]
fn test_copy_count_is_biased() {
    let word = Instr::TcamCopyWord {
        row: 0,
        col: 0,
        n: 1,
        top_to_bottom: false,
    }
    .encode();
    assert_eq!((word >> 15) & 0x1f, 0);
}

#[test]
fn test_names() {
    assert_eq!(Instr::PushMove { lt: 0 }.name(), "push_table_move_addr");
    assert_eq!(Instr::PipeRing.name(), "pipe_ring");
    assert_eq!(Instr::ChipExtension { payload: 0 }.name(), "chip_extension");
}
