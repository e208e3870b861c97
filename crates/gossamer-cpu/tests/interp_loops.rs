mod common;

use common::{load_code, test_cpu};
use gossamer_cpu::state::spr;
use gossamer_cpu::PowerOff;

#[test]
fn run_until_stops_exactly_at_the_goal() {
    let (mut cpu, mut bus) = test_cpu();
    let code = [
        0x3860_0005u32, // li r3, 5
        0x3880_0007,    // li r4, 7
        0x7C63_2214,    // add r3, r3, r4
        0x6000_0000,    // nop
    ];
    load_code(&mut bus, 0x1000, &code);
    cpu.state.pc = 0x1000;

    let off = cpu.run_until(&mut bus, 0x100C);
    assert_eq!(off, PowerOff::StopAddressReached);
    assert_eq!(cpu.state.pc, 0x100C);
    assert_eq!(cpu.state.gpr[3], 12);
}

#[test]
fn branches_inside_and_across_pages() {
    let (mut cpu, mut bus) = test_cpu();
    // Same-page branch forward, then a cross-page branch.
    load_code(&mut bus, 0x1000, &[0x4800_0010]); // b +0x10
    load_code(&mut bus, 0x1010, &[0x4800_2000]); // b +0x2000 (next page)
    load_code(&mut bus, 0x3010, &[0x6000_0000]); // nop
    cpu.state.pc = 0x1000;

    cpu.run_until(&mut bus, 0x3014);
    assert_eq!(cpu.state.pc, 0x3014);
}

#[test]
fn branch_and_link_records_the_return_address() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0x1000, &[0x4800_0101]); // bl +0x100
    load_code(&mut bus, 0x1100, &[0x4E80_0020]); // blr
    cpu.state.pc = 0x1000;

    cpu.run_until(&mut bus, 0x1004);
    assert_eq!(cpu.state.pc, 0x1004);
    assert_eq!(cpu.state.spr[spr::LR], 0x1004);
}

#[test]
fn run_until_region_entered_watches_a_window() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(
        &mut bus,
        0x1000,
        &[
            0x6000_0000, // nop
            0x4800_0200, // b +0x200
        ],
    );
    load_code(&mut bus, 0x1204, &[0x6000_0000]);
    cpu.state.pc = 0x1000;

    let off = cpu.run_until_region_entered(&mut bus, 0x1200, 0x100);
    assert_eq!(off, PowerOff::RegionEntered);
    assert!(cpu.state.pc >= 0x1200 && cpu.state.pc < 0x1300);
}

#[test]
fn conditional_branch_polarity() {
    let (mut cpu, mut bus) = test_cpu();
    let code = [
        0x2C03_0000u32, // cmpwi r3, 0
        0x4182_0008,    // beq +8
        0x3880_0001,    // li r4, 1
        0x38A0_0001,    // li r5, 1
    ];
    load_code(&mut bus, 0x1000, &code);

    cpu.state.pc = 0x1000;
    cpu.state.gpr[3] = 0;
    cpu.state.gpr[4] = 0xFF;
    cpu.run_until(&mut bus, 0x1010);
    assert_eq!(cpu.state.gpr[4], 0xFF, "skipped when equal");
    assert_eq!(cpu.state.gpr[5], 1);

    cpu.state.pc = 0x1000;
    cpu.state.gpr[3] = 2;
    cpu.state.gpr[4] = 0;
    cpu.state.gpr[5] = 0;
    cpu.run_until(&mut bus, 0x1010);
    assert_eq!(cpu.state.gpr[4], 1, "fallthrough when not equal");
}

#[test]
fn bcctr_branches_through_ctr() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0x1000, &[0x4E80_0420]); // bctr
    load_code(&mut bus, 0x1800, &[0x6000_0000]);
    cpu.state.pc = 0x1000;
    cpu.state.spr[spr::CTR] = 0x1800;
    cpu.run_until(&mut bus, 0x1804);
    assert_eq!(cpu.state.pc, 0x1804);
}

#[test]
fn instruction_stats_count_retired_instructions() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0x1000, &[0x6000_0000; 8]);
    cpu.state.pc = 0x1000;
    cpu.run_until(&mut bus, 0x1020);
    assert_eq!(cpu.stats.instrs, 8);
}
