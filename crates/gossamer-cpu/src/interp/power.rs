//! POWER instructions carried by the 601 (and optionally kept decodable on
//! later cores for ROMs that still use them). The MQ register lives in SPR
//! slot 0. The POWER shift-quarter group stays decodable but traps as
//! illegal; nothing in the supported ROM corpus executes it.

use memory::AddressMap;

use super::{ea_x, ra, rb, rd, rot_mb, rot_me, simm};
use crate::exceptions::{cause, ExceptionKind};
use crate::interp::integer::rot_mask;
use crate::state::{cr, spr, xer};
use crate::{Cpu, OpResult};

pub(crate) fn abs<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)];
    let result = if a == 0x8000_0000 { a } else { (a as i32).unsigned_abs() };
    if OV {
        cpu.state.set_ov(a == 0x8000_0000);
    }
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[rd(op)] = result;
    Ok(())
}

pub(crate) fn nabs<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)];
    let result = (-((a as i32).unsigned_abs() as i64)) as u32;
    if OV {
        cpu.state.set_ov(false); // nabs never overflows
    }
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[rd(op)] = result;
    Ok(())
}

pub(crate) fn doz<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)];
    let b = cpu.state.gpr[rb(op)];
    let result = if (a as i32) > (b as i32) { 0 } else { b.wrapping_sub(a) };
    if OV {
        // The difference-or-zero is nonnegative by construction; a negative
        // result means the subtraction wrapped.
        cpu.state.set_ov((result as i32) < 0);
    }
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[rd(op)] = result;
    Ok(())
}

pub(crate) fn dozi(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let a = cpu.state.gpr[ra(op)];
    let imm = simm(op);
    let result = if (a as i32) > imm { 0 } else { (imm as u32).wrapping_sub(a) };
    cpu.state.gpr[rd(op)] = result;
    Ok(())
}

pub(crate) fn mul<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)] as i32;
    let b = cpu.state.gpr[rb(op)] as i32;
    let product = i64::from(a) * i64::from(b);
    let lo = product as u32;
    cpu.state.gpr[rd(op)] = (product >> 32) as u32;
    cpu.state.spr[spr::MQ] = lo;
    if OV {
        cpu.state.set_ov(product != i64::from(lo as i32));
    }
    if RC {
        // CR0 reflects the low-order word left in MQ.
        cpu.state.set_cr0(lo);
    }
    Ok(())
}

pub(crate) fn div<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)];
    let b = cpu.state.gpr[rb(op)] as i32;
    let dividend = ((i64::from(a as i32)) << 32) | i64::from(cpu.state.spr[spr::MQ]);
    let (quotient, remainder, ov) = if b == 0 {
        (0u32, 0u32, true)
    } else {
        let q = dividend / i64::from(b);
        let r = dividend % i64::from(b);
        (q as u32, r as u32, q != i64::from(q as i32))
    };
    if OV {
        cpu.state.set_ov(ov);
    }
    if RC {
        cpu.state.set_cr0(quotient);
    }
    cpu.state.gpr[rd(op)] = quotient;
    cpu.state.spr[spr::MQ] = remainder;
    Ok(())
}

pub(crate) fn divs<const RC: bool, const OV: bool>(
    cpu: &mut Cpu,
    _bus: &mut AddressMap,
    op: u32,
) -> OpResult {
    let a = cpu.state.gpr[ra(op)] as i32;
    let b = cpu.state.gpr[rb(op)] as i32;
    let (quotient, remainder, ov) = if b == 0 || (a == i32::MIN && b == -1) {
        (0i32, 0i32, true)
    } else {
        (a / b, a % b, false)
    };
    if OV {
        cpu.state.set_ov(ov);
    }
    if RC {
        cpu.state.set_cr0(quotient as u32);
    }
    cpu.state.gpr[rd(op)] = quotient as u32;
    cpu.state.spr[spr::MQ] = remainder as u32;
    Ok(())
}

pub(crate) fn clcs(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    // Cache line size by unit number: 1 = instruction cache, 2 = data
    // cache, 3 = secondary cache, 4 = memory queue. All 64-byte lines on
    // the 601; undefined unit numbers read as zero.
    cpu.state.gpr[rd(op)] = match ra(op) {
        1..=4 => 64,
        _ => 0,
    };
    Ok(())
}

pub(crate) fn maskg<const RC: bool>(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let mb = cpu.state.gpr[rd(op)] & 31;
    let me = cpu.state.gpr[rb(op)] & 31;
    let result = rot_mask(mb, me);
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[ra(op)] = result;
    Ok(())
}

pub(crate) fn maskir<const RC: bool>(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let s = cpu.state.gpr[rd(op)];
    let b = cpu.state.gpr[rb(op)];
    let result = (s & b) | (cpu.state.gpr[ra(op)] & !b);
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[ra(op)] = result;
    Ok(())
}

pub(crate) fn rlmi(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let rot = cpu.state.gpr[rb(op)] & 31;
    let mask = rot_mask(rot_mb(op), rot_me(op));
    let rotated = cpu.state.gpr[rd(op)].rotate_left(rot);
    let result = (rotated & mask) | (cpu.state.gpr[ra(op)] & !mask);
    if op & 1 != 0 {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[ra(op)] = result;
    Ok(())
}

pub(crate) fn rrib<const RC: bool>(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let sh = cpu.state.gpr[rb(op)] & 31;
    let mask = 0x8000_0000u32 >> sh;
    let bit = (cpu.state.gpr[rd(op)] & 0x8000_0000) >> sh;
    let result = (cpu.state.gpr[ra(op)] & !mask) | bit;
    if RC {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[ra(op)] = result;
    Ok(())
}

/// Load string and compare byte: load XER-count bytes, stopping after the
/// byte matching XER[16:23]; XER's count field reports bytes transferred.
pub(crate) fn lscbx<const RC: bool>(cpu: &mut Cpu, bus: &mut AddressMap, op: u32) -> OpResult {
    let mut ea = ea_x(cpu, op);
    let count = cpu.state.xer() & xer::COUNT_MASK;
    let match_byte = ((cpu.state.xer() >> 8) & 0xFF) as u8;

    let mut reg = rd(op);
    let mut shift = 0u32;
    let mut word = cpu.state.gpr[reg];
    let mut loaded = 0u32;
    let mut matched = false;

    for _ in 0..count {
        let byte = cpu.read_vmem::<u8>(bus, ea)?;
        let lane = 24 - shift * 8;
        word = (word & !(0xFF << lane)) | (u32::from(byte) << lane);
        cpu.state.gpr[reg] = word;
        ea = ea.wrapping_add(1);
        loaded += 1;
        if byte == match_byte {
            matched = true;
            break;
        }
        if shift == 3 {
            shift = 0;
            reg = (reg + 1) & 0x1F;
            word = cpu.state.gpr[reg];
        } else {
            shift += 1;
        }
    }

    cpu.state.spr[spr::XER] = (cpu.state.xer() & !xer::COUNT_MASK) | loaded;
    if RC {
        let mut bits = (cpu.state.xer() & xer::SO) >> 3;
        if matched {
            bits |= cr::EQ;
        }
        cpu.state.cr = (cpu.state.cr & 0x0FFF_FFFF) | bits;
    }
    Ok(())
}

/// The POWER shift-quarter group (slq/sllq/sle/sre/sraq/…) is not
/// implemented; it decodes but traps with a marker in the log.
pub(crate) fn shift_group_stub(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    log::warn!(
        "POWER shift-group opcode {op:#010X} at {:#010X} is not implemented",
        cpu.state.pc
    );
    Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL))
}
