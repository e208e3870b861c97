mod common;

use common::{load_code, test_cpu};
use gossamer_cpu::state::{msr, spr};

const NOP: u32 = 0x6000_0000;

#[test]
fn masked_external_interrupt_waits_for_mtmsr() {
    let (mut cpu, mut bus) = test_cpu();

    // 100 NOPs, then mtmsr r6 enabling EE.
    let mut code = vec![NOP; 100];
    let mtmsr_r6 = 0x7C00_0000 | (6 << 21) | (146 << 1);
    code.push(mtmsr_r6);
    code.push(NOP);
    load_code(&mut bus, 0xFFF0_0100, &code);

    cpu.assert_ext_int();
    cpu.state.gpr[6] = cpu.state.msr | msr::EE;

    // The masked line must not vector while the NOPs retire.
    for _ in 0..100 {
        cpu.step(&mut bus);
        assert_ne!(cpu.state.pc, 0xFFF0_0500, "vectored while masked");
    }
    let mtmsr_pc = 0xFFF0_0100 + 100 * 4;
    assert_eq!(cpu.state.pc, mtmsr_pc);

    // Enabling EE vectors immediately; SRR0 is the instruction after the
    // mtmsr.
    cpu.step(&mut bus);
    assert_eq!(cpu.state.pc, 0xFFF0_0500);
    assert_eq!(cpu.state.spr[spr::SRR0], mtmsr_pc + 4);
    assert_eq!(cpu.state.msr & msr::EE, 0, "EE masked on entry");
}

#[test]
fn external_interrupt_taken_at_instruction_boundary() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0xFFF0_0100, &[NOP, NOP]);
    cpu.state.msr |= msr::EE;

    cpu.step(&mut bus); // first nop retires untroubled
    assert_eq!(cpu.state.pc, 0xFFF0_0104);

    cpu.assert_ext_int();
    cpu.step(&mut bus);
    assert_eq!(cpu.state.pc, 0xFFF0_0500);
    assert_eq!(cpu.state.spr[spr::SRR0], 0xFFF0_0108, "NIA saved");
}

#[test]
fn released_line_does_not_vector() {
    let (mut cpu, mut bus) = test_cpu();
    load_code(&mut bus, 0xFFF0_0100, &[NOP, NOP, NOP]);
    cpu.state.msr |= msr::EE;

    cpu.assert_ext_int();
    cpu.release_ext_int();
    for _ in 0..3 {
        cpu.step(&mut bus);
    }
    assert_eq!(cpu.state.pc, 0xFFF0_010C);
}

#[test]
fn rfi_with_line_still_asserted_revectors_to_the_rfi_target() {
    let (mut cpu, mut bus) = test_cpu();
    cpu.assert_ext_int();
    cpu.state.spr[spr::SRR0] = 0x0000_3000;
    cpu.state.spr[spr::SRR1] = msr::EE;

    let err = cpu.exec_opcode(&mut bus, 0x4C00_0064).unwrap_err(); // rfi
    assert_eq!(err, gossamer_cpu::ExceptionKind::External);
    // The interrupted context resumes at the original rfi target.
    assert_eq!(cpu.state.spr[spr::SRR0], 0x0000_3000);
    assert_eq!(cpu.state.pc, 0xFFF0_0500);
}
