mod common;

use std::sync::Arc;

use common::{load_code, test_cpu, TB_FREQ_HZ};
use gossamer_cpu::state::{msr, pvr, spr};
use gossamer_cpu::Cpu;
use gossamer_time::FakeHostClock;
use memory::AddressMap;

const MFTB_R3: u32 = 0x7C00_0000 | (3 << 21) | (12 << 16) | (8 << 11) | (371 << 1);
const MFTBU_R4: u32 = 0x7C00_0000 | (4 << 21) | (13 << 16) | (8 << 11) | (371 << 1);

fn realtime_cpu(pvr_val: u32) -> (Cpu, AddressMap, Arc<FakeHostClock>) {
    let host = Arc::new(FakeHostClock::new(0));
    let cpu = Cpu::new_realtime(pvr_val, false, TB_FREQ_HZ, host.clone()).unwrap();
    let mut bus = AddressMap::new();
    bus.add_ram(0, 0x10000).unwrap();
    bus.add_rom(0xFFF0_0000, vec![0; 0x10000]).unwrap();
    (cpu, bus, host)
}

#[test]
fn mftb_after_one_second_counts_the_tb_frequency() {
    let (mut cpu, mut bus, host) = realtime_cpu(pvr::MPC750);
    host.advance_ns(1_000_000_000);

    cpu.exec_opcode(&mut bus, MFTB_R3).unwrap();
    cpu.exec_opcode(&mut bus, MFTBU_R4).unwrap();

    let tb = (u64::from(cpu.state.gpr[4]) << 32) | u64::from(cpu.state.gpr[3]);
    assert!(
        (tb as i64 - TB_FREQ_HZ as i64).abs() <= 1,
        "TB after 1 s = {tb}, expected ≈ {TB_FREQ_HZ}"
    );
}

#[test]
fn tbr_write_restarts_from_the_written_value() {
    let (mut cpu, mut bus, host) = realtime_cpu(pvr::MPC750);

    // mttbl r5 / mttbu r6 (SPR 284/285).
    cpu.state.gpr[5] = 0x1000;
    let mttbl = 0x7C00_0000 | (5 << 21) | (28 << 16) | (8 << 11) | (467 << 1);
    cpu.exec_opcode(&mut bus, mttbl).unwrap();
    cpu.state.gpr[6] = 7;
    let mttbu = 0x7C00_0000 | (6 << 21) | (29 << 16) | (8 << 11) | (467 << 1);
    cpu.exec_opcode(&mut bus, mttbu).unwrap();

    host.advance_ns(1_000_000_000);
    cpu.exec_opcode(&mut bus, MFTB_R3).unwrap();
    cpu.exec_opcode(&mut bus, MFTBU_R4).unwrap();

    assert_eq!(cpu.state.gpr[4], 7);
    let lo = u64::from(cpu.state.gpr[3]);
    assert!((lo as i64 - (0x1000 + TB_FREQ_HZ as i64)).abs() <= 1, "lo = {lo:#X}");
}

#[test]
fn mftb_is_illegal_on_random_sprs() {
    let (mut cpu, mut bus) = test_cpu();
    // mftb with an SPR field that is neither TBL nor TBU.
    let bad = 0x7C00_0000 | (3 << 21) | (1 << 16) | (371 << 1);
    let err = cpu.exec_opcode(&mut bus, bad).unwrap_err();
    assert_eq!(err, gossamer_cpu::ExceptionKind::Program);
}

#[test]
fn decrementer_write_arms_a_oneshot_that_vectors_when_ee_set() {
    // Deterministic clock: each retired instruction is 16 ns.
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0xFFF0_0100, &[0x4800_0000]); // b . (spin)
    cpu.state.msr |= msr::EE;

    // mtdec r5 with a small count.
    cpu.state.gpr[5] = 0x40;
    let mtdec = 0x7C00_0000 | (5 << 21) | (22 << 16) | (467 << 1);
    cpu.exec_opcode(&mut bus, mtdec).unwrap();

    cpu.state.pc = 0xFFF0_0100;
    let mut took = false;
    for _ in 0..10_000 {
        cpu.step(&mut bus);
        if cpu.state.pc == 0xFFF0_0900 {
            took = true;
            break;
        }
    }
    assert!(took, "decrementer exception never fired");
    assert_eq!(cpu.state.spr[spr::SRR0], 0xFFF0_0100, "spin loop resume point");
}

#[test]
fn masked_decrementer_stays_pending_until_ee_is_enabled() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0xFFF0_0100, &[0x4800_0000]); // b .
    assert_eq!(cpu.state.msr & msr::EE, 0);

    cpu.state.gpr[5] = 0x10;
    let mtdec = 0x7C00_0000 | (5 << 21) | (22 << 16) | (467 << 1);
    cpu.exec_opcode(&mut bus, mtdec).unwrap();

    cpu.state.pc = 0xFFF0_0100;
    for _ in 0..5_000 {
        cpu.step(&mut bus);
        assert_ne!(cpu.state.pc, 0xFFF0_0900, "must not vector while masked");
    }

    // mtmsr enabling EE replays the pending decrementer immediately.
    cpu.state.gpr[6] = cpu.state.msr | msr::EE;
    let mtmsr_r6 = 0x7C00_0000 | (6 << 21) | (146 << 1);
    load_code(&mut bus, 0xFFF0_0100, &[mtmsr_r6]);
    cpu.state.pc = 0xFFF0_0100;
    cpu.step(&mut bus);
    assert_eq!(cpu.state.pc, 0xFFF0_0900);
    assert_eq!(cpu.state.spr[spr::SRR0], 0xFFF0_0104);
}

#[test]
fn dec_reads_count_down() {
    let (mut cpu, mut bus, host) = realtime_cpu(pvr::MPC750);
    cpu.state.gpr[5] = 1_000_000;
    let mtdec = 0x7C00_0000 | (5 << 21) | (22 << 16) | (467 << 1);
    cpu.exec_opcode(&mut bus, mtdec).unwrap();

    host.advance_ns(1_000_000); // 1 ms ≈ 16705 ticks
    let mfdec = 0x7C00_0000 | (3 << 21) | (22 << 16) | (339 << 1);
    cpu.exec_opcode(&mut bus, mfdec).unwrap();
    let dec = cpu.state.gpr[3];
    let expected = 1_000_000 - 16_705;
    assert!((dec as i64 - expected as i64).abs() <= 1, "dec = {dec}");
}

#[test]
fn rtc_counts_seconds_and_masked_nanoseconds_on_601() {
    let (mut cpu, mut bus, host) = realtime_cpu(pvr::MPC601);
    host.advance_ns(2_500_000_000);

    let mfrtcu = 0x7C00_0000 | (3 << 21) | (4 << 16) | (339 << 1);
    let mfrtcl = 0x7C00_0000 | (4 << 21) | (5 << 16) | (339 << 1);
    cpu.exec_opcode(&mut bus, mfrtcu).unwrap();
    cpu.exec_opcode(&mut bus, mfrtcl).unwrap();

    assert_eq!(cpu.state.gpr[3], 2);
    assert_eq!(cpu.state.gpr[4], 500_000_000 & 0x3FFF_FF80);
}

#[test]
fn rtc_sprs_are_illegal_off_the_601() {
    let (mut cpu, mut bus) = test_cpu();
    let mfrtcu = 0x7C00_0000 | (3 << 21) | (4 << 16) | (339 << 1);
    let err = cpu.exec_opcode(&mut bus, mfrtcu).unwrap_err();
    assert_eq!(err, gossamer_cpu::ExceptionKind::Program);
}

#[test]
fn pvr_writes_are_dropped() {
    let (mut cpu, mut bus) = test_cpu();
    let before = cpu.state.spr[spr::PVR];
    cpu.state.gpr[5] = 0xDEAD_0000;
    let mtpvr = 0x7C00_0000 | (5 << 21) | (31 << 16) | (8 << 11) | (467 << 1);
    cpu.exec_opcode(&mut bus, mtpvr).unwrap();
    assert_eq!(cpu.state.spr[spr::PVR], before);
}

#[test]
fn xer_writes_are_masked() {
    let (mut cpu, mut bus) = test_cpu();
    cpu.state.gpr[5] = 0xFFFF_FFFF;
    let mtxer = 0x7C00_0000 | (5 << 21) | (1 << 16) | (467 << 1);
    cpu.exec_opcode(&mut bus, mtxer).unwrap();
    assert_eq!(cpu.state.spr[spr::XER], 0xE000_FF7F);
}
