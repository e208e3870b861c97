//! Branch and condition-register handlers. Branch handlers never write PC
//! directly: they record the NIA and set the branch flag, and the loop
//! commits it.

use memory::AddressMap;

use super::{ra, rb, rd};
use crate::state::spr;
use crate::{Cpu, ExecFlags, OpResult};

pub(crate) const CR_AND: u8 = 0;
pub(crate) const CR_ANDC: u8 = 1;
pub(crate) const CR_EQV: u8 = 2;
pub(crate) const CR_NAND: u8 = 3;
pub(crate) const CR_NOR: u8 = 4;
pub(crate) const CR_OR: u8 = 5;
pub(crate) const CR_ORC: u8 = 6;
pub(crate) const CR_XOR: u8 = 7;

pub(crate) fn b<const LK: bool, const AA: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let li = (((op & !3) << 6) as i32) >> 6;
    cpu.nia = if AA { li as u32 } else { cpu.state.pc.wrapping_add(li as u32) };
    if LK {
        cpu.state.spr[spr::LR] = cpu.state.pc.wrapping_add(4);
    }
    cpu.exec_flags |= ExecFlags::BRANCH;
    Ok(())
}

/// Condition/count test shared by bc, bclr and bcctr. `decrement` controls
/// whether CTR participates.
#[inline]
fn branch_taken(cpu: &mut Cpu, bo: u32, bi: u32, decrement: bool) -> bool {
    if decrement && bo & 0x04 == 0 {
        cpu.state.spr[spr::CTR] = cpu.state.spr[spr::CTR].wrapping_sub(1);
    }
    let ctr_ok = bo & 0x04 != 0 || (cpu.state.spr[spr::CTR] != 0) == (bo & 0x02 == 0);
    let cnd_ok = bo & 0x10 != 0 || (cpu.state.cr & (0x8000_0000 >> bi) != 0) == (bo & 0x08 != 0);
    ctr_ok && cnd_ok
}

pub(crate) fn bc<const LK: bool, const AA: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let bo = rd(op) as u32;
    let bi = ra(op) as u32;
    let bd = (op & 0xFFFC) as u16 as i16 as i32;
    if branch_taken(cpu, bo, bi, true) {
        cpu.nia = if AA { bd as u32 } else { cpu.state.pc.wrapping_add(bd as u32) };
        cpu.exec_flags |= ExecFlags::BRANCH;
    }
    if LK {
        cpu.state.spr[spr::LR] = cpu.state.pc.wrapping_add(4);
    }
    Ok(())
}

pub(crate) fn bclr<const LK: bool>(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let bo = rd(op) as u32;
    let bi = ra(op) as u32;
    let target = cpu.state.spr[spr::LR] & !3;
    if branch_taken(cpu, bo, bi, true) {
        cpu.nia = target;
        cpu.exec_flags |= ExecFlags::BRANCH;
    }
    if LK {
        cpu.state.spr[spr::LR] = cpu.state.pc.wrapping_add(4);
    }
    Ok(())
}

pub(crate) fn bcctr<const LK: bool, const FOR601: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let bo = rd(op) as u32;
    let bi = ra(op) as u32;
    let ctr = cpu.state.spr[spr::CTR];
    // The 601 decrements CTR on bcctr; later cores treat BO[2]=0 here as
    // invalid and leave CTR alone.
    let taken = if FOR601 {
        branch_taken(cpu, bo, bi, true)
    } else {
        branch_taken(cpu, bo, bi, false)
    };
    if taken {
        cpu.nia = ctr & !3;
        cpu.exec_flags |= ExecFlags::BRANCH;
    }
    if LK {
        cpu.state.spr[spr::LR] = cpu.state.pc.wrapping_add(4);
    }
    Ok(())
}

pub(crate) fn mcrf(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let crf_d = (op >> 23) & 7;
    let crf_s = (op >> 18) & 7;
    let field = (cpu.state.cr >> (28 - crf_s * 4)) & 0xF;
    cpu.state.set_cr_field(crf_d, field);
    Ok(())
}

pub(crate) fn crop<const OP: u8>(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let d = rd(op) as u32;
    let a = (cpu.state.cr >> (31 - ra(op) as u32)) & 1;
    let b = (cpu.state.cr >> (31 - rb(op) as u32)) & 1;
    let bit = match OP {
        CR_AND => a & b,
        CR_ANDC => a & !b,
        CR_EQV => !(a ^ b),
        CR_NAND => !(a & b),
        CR_NOR => !(a | b),
        CR_OR => a | b,
        CR_ORC => a | !b,
        _ => a ^ b,
    } & 1;
    if bit != 0 {
        cpu.state.cr |= 0x8000_0000 >> d;
    } else {
        cpu.state.cr &= !(0x8000_0000 >> d);
    }
    Ok(())
}
