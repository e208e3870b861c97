//! Supervisor and system handlers: SPR/MSR/SR access, traps, syscall,
//! context synchronization, cache and TLB management ops.

use memory::AddressMap;

use super::{ra, rb, rd};
use crate::exceptions::{cause, ExceptionKind};
use crate::state::{msr, spr, xer};
use crate::{CpuEvent, Cpu, OpResult};

#[inline]
fn privileged(cpu: &mut Cpu) -> OpResult {
    if !cpu.state.supervisor() {
        return Err(cpu.raise(ExceptionKind::Program, cause::PRIVILEGED));
    }
    cpu.stats.supervisor_instrs += 1;
    Ok(())
}

pub(crate) fn illegal_op(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    log::debug!("illegal opcode {op:#010X} at {:#010X}", cpu.state.pc);
    Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL))
}

pub(crate) fn sc(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    cpu.do_ctx_sync();
    Err(cpu.raise(ExceptionKind::Syscall, cause::SYSCALL))
}

pub(crate) fn rfi(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)?;
    let restored = cpu.state.spr[spr::SRR1] & msr::RFI_MASK;
    cpu.state.msr = ((cpu.state.msr & !msr::RFI_MASK) | restored) & !msr::POW;
    let target = cpu.state.spr[spr::SRR0] & !3;

    // A line still asserted (or a pending decrementer) fires immediately,
    // resuming at the rfi target afterwards.
    if cpu.state.msr & msr::EE != 0 && cpu.int_pin {
        return Err(cpu.raise_with_srr0(ExceptionKind::External, 0, target));
    }
    if cpu.state.msr & msr::EE != 0 && cpu.dec_pending {
        cpu.dec_pending = false;
        return Err(cpu.raise_with_srr0(ExceptionKind::Decrementer, 0, target));
    }

    cpu.nia = target;
    cpu.do_ctx_sync();
    cpu.on_mode_changed();
    cpu.exec_flags |= crate::ExecFlags::BRANCH | crate::ExecFlags::RFI;
    Ok(())
}

#[inline]
fn trap_condition(to: u32, a: u32, b: u32) -> bool {
    (((a as i32) < (b as i32)) && to & 0x10 != 0)
        || (((a as i32) > (b as i32)) && to & 0x08 != 0)
        || (a == b && to & 0x04 != 0)
        || (a < b && to & 0x02 != 0)
        || (a > b && to & 0x01 != 0)
}

pub(crate) fn tw(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let to = rd(op) as u32;
    if trap_condition(to, cpu.state.gpr[ra(op)], cpu.state.gpr[rb(op)]) {
        return Err(cpu.raise(ExceptionKind::Program, cause::TRAP));
    }
    Ok(())
}

pub(crate) fn twi(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let to = rd(op) as u32;
    if trap_condition(to, cpu.state.gpr[ra(op)], super::simm(op) as u32) {
        return Err(cpu.raise(ExceptionKind::Program, cause::TRAP));
    }
    Ok(())
}

// ------------------------------------------------------------ CR and XER

pub(crate) fn mfcr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    cpu.state.gpr[rd(op)] = cpu.state.cr;
    Ok(())
}

pub(crate) fn mtcrf(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let crm = (op >> 12) & 0xFF;
    let mut mask = 0u32;
    for field in 0..8 {
        if crm & (0x80 >> field) != 0 {
            mask |= 0xF000_0000 >> (field * 4);
        }
    }
    cpu.state.cr = (cpu.state.cr & !mask) | (cpu.state.gpr[rd(op)] & mask);
    Ok(())
}

pub(crate) fn mcrxr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let crf = (op >> 23) & 7;
    cpu.state.set_cr_field(crf, cpu.state.xer() >> 28);
    cpu.state.spr[spr::XER] &= 0x0FFF_FFFF;
    Ok(())
}

// ------------------------------------------------------------- MSR / SR

pub(crate) fn mfmsr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    cpu.state.gpr[rd(op)] = cpu.state.msr;
    Ok(())
}

pub(crate) fn mtmsr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    cpu.state.msr = cpu.state.gpr[rd(op)];

    // Enabling EE with a line or decrementer pending vectors at once; the
    // saved PC is the instruction after this mtmsr.
    let resume = cpu.state.pc.wrapping_add(4);
    if cpu.state.msr & msr::EE != 0 && cpu.int_pin {
        return Err(cpu.raise_with_srr0(ExceptionKind::External, 0, resume));
    }
    if cpu.state.msr & msr::EE != 0 && cpu.dec_pending {
        cpu.dec_pending = false;
        return Err(cpu.raise_with_srr0(ExceptionKind::Decrementer, 0, resume));
    }
    cpu.on_mode_changed();
    Ok(())
}

pub(crate) fn mfsr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    cpu.state.gpr[rd(op)] = cpu.state.sr[ra(op) & 0xF];
    Ok(())
}

pub(crate) fn mfsrin(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    let idx = (cpu.state.gpr[rb(op)] >> 28) as usize;
    cpu.state.gpr[rd(op)] = cpu.state.sr[idx];
    Ok(())
}

pub(crate) fn mtsr(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    let idx = ra(op) & 0xF;
    let val = cpu.state.gpr[rd(op)];
    if cpu.state.sr[idx] != val {
        cpu.state.sr[idx] = val;
        cpu.on_pat_ctx_changed();
    }
    Ok(())
}

pub(crate) fn mtsrin(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    let idx = (cpu.state.gpr[rb(op)] >> 28) as usize;
    let val = cpu.state.gpr[rd(op)];
    if cpu.state.sr[idx] != val {
        cpu.state.sr[idx] = val;
        cpu.on_pat_ctx_changed();
    }
    Ok(())
}

// ------------------------------------------------------------------ SPRs

#[inline]
fn spr_field(op: u32) -> usize {
    ((rb(op) << 5) | ra(op)) & 0x3FF
}

pub(crate) fn mfspr(cpu: &mut Cpu, bus: &mut AddressMap, op: u32) -> OpResult {
    let _ = bus;
    let ref_spr = spr_field(op);
    if ref_spr & 0x10 != 0 {
        privileged(cpu)?;
    }
    let now = cpu.now_ns();
    let val = match ref_spr {
        spr::MQ if !cpu.is_601 => {
            return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL));
        }
        spr::RTCL_U | spr::RTCU_U => {
            if !cpu.is_601 {
                return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL));
            }
            let (hi, lo) = cpu.time.rtc_value(now);
            cpu.state.spr[spr::RTCU_S] = hi;
            cpu.state.spr[spr::RTCL_S] = lo;
            if ref_spr == spr::RTCL_U {
                lo
            } else {
                hi
            }
        }
        spr::DEC_U if !cpu.is_601 => {
            return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL));
        }
        spr::DEC_U | spr::DEC_S => {
            let dec = cpu.time.dec_value(now);
            cpu.state.spr[spr::DEC_S] = dec;
            dec
        }
        _ => cpu.state.spr[ref_spr],
    };
    cpu.state.gpr[rd(op)] = val;
    Ok(())
}

pub(crate) fn mtspr(cpu: &mut Cpu, bus: &mut AddressMap, op: u32) -> OpResult {
    let _ = bus;
    let ref_spr = spr_field(op);
    if ref_spr & 0x10 != 0 {
        privileged(cpu)?;
    }
    let val = cpu.state.gpr[rd(op)];
    let now = cpu.now_ns();
    match ref_spr {
        spr::MQ => {
            if !cpu.is_601 {
                return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL));
            }
            cpu.state.spr[ref_spr] = val;
        }
        spr::RTCL_U | spr::RTCU_U | spr::DEC_U => {
            if !cpu.is_601 {
                return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL));
            }
            // User-mode RTC/DEC aliases are read-only on the 601.
        }
        spr::XER => cpu.state.spr[ref_spr] = val & xer::WRITE_MASK,
        spr::SDR1 => {
            if cpu.state.spr[ref_spr] != val {
                cpu.state.spr[ref_spr] = val;
                cpu.on_pat_ctx_changed();
            }
        }
        spr::RTCL_S => {
            cpu.time.write_rtc_lo(now, val);
            let (hi, lo) = cpu.time.rtc_value(now);
            cpu.state.spr[spr::RTCL_S] = lo;
            cpu.state.spr[spr::RTCU_S] = hi;
        }
        spr::RTCU_S => {
            cpu.time.write_rtc_hi(now, val);
            let (hi, lo) = cpu.time.rtc_value(now);
            cpu.state.spr[spr::RTCL_S] = lo;
            cpu.state.spr[spr::RTCU_S] = hi;
        }
        spr::DEC_S => {
            cpu.state.spr[spr::DEC_S] = val;
            update_decrementer(cpu, val);
        }
        spr::TBL_S => {
            cpu.time.write_tbr(now, 0xFFFF_FFFF_0000_0000, u64::from(val));
            cpu.state.spr[spr::TBL_S] = val;
            cpu.state.spr[spr::TBU_S] = (cpu.time.tbr_value(now) >> 32) as u32;
        }
        spr::TBU_S => {
            cpu.time.write_tbr(now, 0x0000_0000_FFFF_FFFF, u64::from(val) << 32);
            cpu.state.spr[spr::TBL_S] = cpu.time.tbr_value(now) as u32;
            cpu.state.spr[spr::TBU_S] = val;
        }
        spr::PVR => {} // read-only
        spr::IBAT0U..=spr::IBAT3L | spr::DBAT0U..=spr::DBAT3L => {
            cpu.state.spr[ref_spr] = val;
            cpu.bat_updated(ref_spr);
        }
        _ => cpu.state.spr[ref_spr] = val,
    }
    Ok(())
}

/// Every DEC write cancels and re-arms the zero-crossing timer.
fn update_decrementer(cpu: &mut Cpu, val: u32) {
    let now = cpu.now_ns();
    let delay_ns = cpu.time.write_dec(now, val);
    cpu.dec_pending = false;

    if cpu.is_601 {
        // The 601 DEC counts through the RTC; no timer modelled.
        return;
    }
    if let Some(id) = cpu.dec_timer.take() {
        cpu.events.cancel(id);
    }
    cpu.dec_timer = Some(cpu.add_oneshot(delay_ns, CpuEvent::Decrementer));
}

pub(crate) fn mftb(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    let ref_spr = spr_field(op);
    let now = cpu.now_ns();
    let tbr = cpu.time.tbr_value(now);
    match ref_spr {
        spr::TBL_U => {
            cpu.state.spr[spr::TBL_S] = tbr as u32;
            cpu.state.spr[spr::TBU_S] = (tbr >> 32) as u32;
            cpu.state.gpr[rd(op)] = tbr as u32;
        }
        spr::TBU_U => {
            cpu.state.spr[spr::TBL_S] = tbr as u32;
            cpu.state.spr[spr::TBU_S] = (tbr >> 32) as u32;
            cpu.state.gpr[rd(op)] = (tbr >> 32) as u32;
        }
        _ => return Err(cpu.raise(ExceptionKind::Program, cause::ILLEGAL)),
    }
    Ok(())
}

// ----------------------------------------------- sync, cache, TLB groups

pub(crate) fn sync(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn eieio(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn isync(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    cpu.do_ctx_sync();
    // Prefetched/predecoded state must be rebuilt.
    cpu.block_epoch = cpu.block_epoch.wrapping_add(1);
    Ok(())
}

pub(crate) fn icbi(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn dcbf(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn dcbst(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn dcbt(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn dcbtst(_cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    Ok(())
}

pub(crate) fn dcbi(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)
}

pub(crate) fn tlbie(cpu: &mut Cpu, _bus: &mut AddressMap, op: u32) -> OpResult {
    privileged(cpu)?;
    let ea = cpu.state.gpr[rb(op)];
    cpu.flush_tlb_entry(ea);
    Ok(())
}

pub(crate) fn tlbia(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)?;
    cpu.on_pat_ctx_changed();
    Ok(())
}

pub(crate) fn tlbsync(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)
}

pub(crate) fn tlbld(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)
}

pub(crate) fn tlbli(cpu: &mut Cpu, _bus: &mut AddressMap, _op: u32) -> OpResult {
    privileged(cpu)
}
