//! The canonical interpreter: fetch through the MMU, dispatch through the
//! dense table, service timers and interrupt lines between instructions.

pub(crate) mod branch;
pub(crate) mod fpu;
pub(crate) mod integer;
pub(crate) mod loadstore;
pub(crate) mod power;
pub(crate) mod system;

use gossamer_time::InterruptSink;
use memory::AddressMap;

use crate::exceptions::ExceptionKind;
use crate::state::msr;
use crate::{Cpu, CpuEvent, ExecFlags, OpResult, PowerOff};

// ------------------------------------------------------- field extraction

#[inline(always)]
pub(crate) fn rd(op: u32) -> usize {
    ((op >> 21) & 31) as usize
}
#[inline(always)]
pub(crate) fn ra(op: u32) -> usize {
    ((op >> 16) & 31) as usize
}
#[inline(always)]
pub(crate) fn rb(op: u32) -> usize {
    ((op >> 11) & 31) as usize
}
#[inline(always)]
pub(crate) fn reg_c(op: u32) -> usize {
    ((op >> 6) & 31) as usize
}
#[inline(always)]
pub(crate) fn simm(op: u32) -> i32 {
    op as u16 as i16 as i32
}
#[inline(always)]
pub(crate) fn uimm(op: u32) -> u32 {
    op as u16 as u32
}
#[inline(always)]
pub(crate) fn crf_d(op: u32) -> u32 {
    (op >> 23) & 7
}
#[inline(always)]
pub(crate) fn rot_sh(op: u32) -> u32 {
    (op >> 11) & 31
}
#[inline(always)]
pub(crate) fn rot_mb(op: u32) -> u32 {
    (op >> 6) & 31
}
#[inline(always)]
pub(crate) fn rot_me(op: u32) -> u32 {
    (op >> 1) & 31
}

/// EA for D-form loads/stores: rA|0 + d.
#[inline(always)]
pub(crate) fn ea_d(cpu: &Cpu, op: u32) -> u32 {
    let base = if ra(op) == 0 { 0 } else { cpu.state.gpr[ra(op)] };
    base.wrapping_add(simm(op) as u32)
}

/// EA for X-form loads/stores: rA|0 + rB.
#[inline(always)]
pub(crate) fn ea_x(cpu: &Cpu, op: u32) -> u32 {
    let base = if ra(op) == 0 { 0 } else { cpu.state.gpr[ra(op)] };
    base.wrapping_add(cpu.state.gpr[rb(op)])
}

// `libc` does not expose <fenv.h>; declare the symbols directly since the
// standard C library (already linked via `libc`) provides them.
#[cfg(target_os = "linux")]
mod fenv {
    pub const FE_TONEAREST: i32 = 0x0;
    pub const FE_DOWNWARD: i32 = 0x400;
    pub const FE_UPWARD: i32 = 0x800;
    pub const FE_TOWARDZERO: i32 = 0xc00;

    extern "C" {
        pub fn fesetround(mode: i32) -> i32;
    }
}

/// Set the host FP rounding mode from FPSCR[RN].
#[cfg(target_os = "linux")]
pub(crate) fn set_host_rounding(rn: u32) {
    let mode = match rn & 3 {
        0 => fenv::FE_TONEAREST,
        1 => fenv::FE_TOWARDZERO,
        2 => fenv::FE_UPWARD,
        _ => fenv::FE_DOWNWARD,
    };
    unsafe {
        fenv::fesetround(mode);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_host_rounding(_rn: u32) {}

// ------------------------------------------------------------- run loops

enum StopCond {
    None,
    Addr(u32),
    Region { start: u32, end: u32 },
}

struct PinSink<'a> {
    pin: &'a mut bool,
}

impl InterruptSink for PinSink<'_> {
    fn assert_line(&mut self, _line: u32) {
        *self.pin = true;
    }

    fn release_line(&mut self, _line: u32) {
        *self.pin = false;
    }
}

impl Cpu {
    /// Fire due timers, deliver device callbacks, and compute the cycle
    /// count at which the loop must look at the queue again.
    pub(crate) fn process_events(&mut self, bus: &mut AddressMap) -> u64 {
        let now = self.time.now_ns(self.icycles);
        while let Some(ev) = self.events.pop_due(now) {
            match ev.payload {
                CpuEvent::Decrementer => {
                    self.dec_timer = None;
                    self.time.dec_expired(now);
                    self.dec_pending = true;
                }
                CpuEvent::Device { region, cookie } => {
                    let mut sink = PinSink { pin: &mut self.int_pin };
                    match bus.device_mut(region) {
                        Some(dev) => dev.on_timer(cookie, &mut sink),
                        None => log::warn!("timer for non-device region {region:?} dropped"),
                    }
                }
            }
        }
        self.timer_dirty = false;
        match self.events.next_deadline_ns() {
            Some(deadline) => self.icycles + self.time.clock.ns_to_cycles(deadline - now).max(1),
            None => self.icycles + 25_000,
        }
    }

    /// Interrupt lines are sampled only between instructions and only when
    /// MSR[EE] is set; a masked line stays pending.
    #[inline]
    fn maybe_take_interrupt(&mut self) -> OpResult {
        if self.state.msr & msr::EE == 0 || !(self.int_pin || self.dec_pending) {
            return Ok(());
        }
        if self.int_pin {
            return Err(self.raise_with_srr0(ExceptionKind::External, 0, self.state.pc));
        }
        self.dec_pending = false;
        Err(self.raise_with_srr0(ExceptionKind::Decrementer, 0, self.state.pc))
    }

    /// Execute one instruction at PC and advance. Shared by every loop.
    #[inline]
    fn exec_one(&mut self, bus: &mut AddressMap, max_cycles: &mut u64) -> OpResult {
        self.exec_flags = ExecFlags::empty();
        let opcode = self.fetch_instr(bus, self.state.pc)?;
        let handler = self.table.lookup(opcode);
        handler(self, bus, opcode)?;
        self.stats.instrs += 1;
        self.icycles += 1;

        if self.icycles >= *max_cycles || self.timer_dirty {
            *max_cycles = self.process_events(bus);
        }

        let branched = self.exec_flags.contains(ExecFlags::BRANCH);
        let next_pc = if branched { self.nia } else { self.state.pc.wrapping_add(4) };

        if self.state.msr & msr::SE != 0 || (self.state.msr & msr::BE != 0 && branched) {
            return Err(self.raise_with_srr0(ExceptionKind::Trace, 0, next_pc));
        }

        self.state.pc = next_pc;
        self.maybe_take_interrupt()
    }

    fn exec_inner(&mut self, bus: &mut AddressMap, stop: &StopCond) -> OpResult {
        let mut max_cycles = 0u64;
        while self.is_powered_on() {
            #[cfg(feature = "dtc")]
            {
                if self.try_threaded_block(bus, &mut max_cycles)? {
                    self.maybe_take_interrupt()?;
                    self.check_stop(stop);
                    continue;
                }
            }
            self.exec_one(bus, &mut max_cycles)?;
            self.check_stop(stop);
        }
        Ok(())
    }

    #[inline]
    fn check_stop(&mut self, stop: &StopCond) {
        match *stop {
            StopCond::None => {}
            StopCond::Addr(goal) => {
                if self.state.pc == goal {
                    self.stop(PowerOff::StopAddressReached);
                }
            }
            StopCond::Region { start, end } => {
                if self.state.pc >= start && self.state.pc < end {
                    self.stop(PowerOff::RegionEntered);
                }
            }
        }
    }

    fn run_loop(&mut self, bus: &mut AddressMap, stop: StopCond) -> PowerOff {
        self.power_on_flag(true);
        while self.is_powered_on() {
            if self.exec_inner(bus, &stop).is_err() {
                // Landing pad: resume at the exception vector.
                self.state.pc = self.nia;
                self.check_stop(&stop);
            }
        }
        self.off_reason()
    }

    /// Run until something calls `power_off`.
    pub fn run(&mut self, bus: &mut AddressMap) -> PowerOff {
        self.run_loop(bus, StopCond::None)
    }

    /// Run until PC lands exactly on `goal_addr`.
    pub fn run_until(&mut self, bus: &mut AddressMap, goal_addr: u32) -> PowerOff {
        self.run_loop(bus, StopCond::Addr(goal_addr))
    }

    /// Run until PC enters `[start, start + size)`.
    pub fn run_until_region_entered(
        &mut self,
        bus: &mut AddressMap,
        start: u32,
        size: u32,
    ) -> PowerOff {
        self.run_loop(bus, StopCond::Region { start, end: start.wrapping_add(size) })
    }

    /// Dispatch one already-fetched opcode at the current PC. Test-vector
    /// harnesses drive single instructions through this without a fetch.
    pub fn exec_opcode(
        &mut self,
        bus: &mut AddressMap,
        opcode: u32,
    ) -> Result<(), ExceptionKind> {
        self.exec_flags = ExecFlags::empty();
        let handler = self.table.lookup(opcode);
        match handler(self, bus, opcode) {
            Ok(()) => {
                self.stats.instrs += 1;
                self.icycles += 1;
                if self.exec_flags.contains(ExecFlags::BRANCH) {
                    self.state.pc = self.nia;
                } else {
                    self.state.pc = self.state.pc.wrapping_add(4);
                }
                Ok(())
            }
            Err(e) => {
                self.state.pc = self.nia;
                Err(e.kind)
            }
        }
    }

    /// Execute exactly one instruction (debugger single-step).
    pub fn step(&mut self, bus: &mut AddressMap) {
        self.power_on_flag(true);
        let mut max_cycles = 0u64;
        if self.exec_one(bus, &mut max_cycles).is_err() {
            self.state.pc = self.nia;
        }
        self.power_on_flag(false);
    }
}
