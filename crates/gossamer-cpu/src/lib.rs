//! 32-bit PowerPC CPU core: cycle-aware interpreter, MMU, exception engine,
//! predecoded threaded executor and time-base facility.
//!
//! The core owns the architected state and its translation caches; the
//! guest physical address space is a [`memory::AddressMap`] passed by
//! `&mut` into every run entry, the way devices and the machine builder
//! share it. Devices never run in parallel with the core: their timer
//! callbacks fire between two guest instructions.

use std::sync::Arc;

use bitflags::bitflags;
use gossamer_mmu::BatEntry;
use gossamer_time::{ClockMode, HostClock, SystemClock, TimerId, TimerQueue, VirtualClock};
use memory::{AddressMap, RegionId};
use thiserror::Error;

pub mod exceptions;
pub mod state;
pub mod timebase;

mod dispatch;
mod interp;
mod regnames;
mod threaded;
mod vmem;

pub use exceptions::{Exception, ExceptionKind};
pub use regnames::RegError;
pub use state::{Fpr, ProcessorState};
pub use threaded::CachedInstr;

use dispatch::OpTable;
use state::{msr, pvr, spr};
use timebase::TimeBase;
use vmem::TlbEntry;

pub type OpResult = Result<(), Exception>;
pub(crate) type OpFn = fn(&mut Cpu, &mut AddressMap, u32) -> OpResult;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct ExecFlags: u32 {
        const BRANCH = 1 << 0;
        const RFI = 1 << 1;
    }
}

/// Why a run loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerOff {
    /// `power_off()` was called (debugger, HALT register, …).
    Halted,
    /// `run_until` reached its goal address.
    StopAddressReached,
    /// `run_until_region_entered` saw PC enter the watched region.
    RegionEntered,
}

/// Lightweight execution counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecStats {
    pub instrs: u64,
    pub supervisor_instrs: u64,
    pub exceptions: u64,
    pub loads: u64,
    pub stores: u64,
}

/// Payloads for the core's one-shot timer queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuEvent {
    Decrementer,
    /// Deliver `cookie` to the MMIO device owning `region`.
    Device { region: RegionId, cookie: u32 },
}

/// Queued context-synchronization work, run by `isync`, `sc` and `rfi`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtxSyncAction {
    MmuModeReload,
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("unsupported processor version {pvr:#010X}")]
    UnsupportedPvr { pvr: u32 },
    #[error("time-base frequency {hz} Hz is out of range")]
    BadTbFrequency { hz: u64 },
}

pub struct Cpu {
    pub state: ProcessorState,
    pub time: TimeBase,
    pub stats: ExecStats,
    pub events: TimerQueue<CpuEvent>,

    table: OpTable,
    pub(crate) is_601: bool,
    pub(crate) include_601: bool,

    // MMU
    pub(crate) ibat: [BatEntry; 4],
    pub(crate) dbat: [BatEntry; 4],
    pub(crate) itlb: Option<TlbEntry>,
    pub(crate) dtlb_read: Option<TlbEntry>,
    pub(crate) dtlb_write: Option<TlbEntry>,
    /// Bumped whenever translation may have changed; predecoded blocks
    /// carry the epoch they were built under.
    pub(crate) block_epoch: u32,
    pub(crate) block: threaded::BlockCache,

    // Execution control
    pub(crate) exec_flags: ExecFlags,
    pub(crate) nia: u32,
    pub(crate) icycles: u64,
    power_on: bool,
    power_off_reason: PowerOff,

    // Interrupts and timers
    pub(crate) int_pin: bool,
    pub(crate) dec_pending: bool,
    pub(crate) dec_timer: Option<TimerId>,
    pub(crate) timer_dirty: bool,

    ctx_sync_actions: Vec<CtxSyncAction>,
}

impl Cpu {
    /// Build a core with a deterministic virtual clock (`icnt_factor` 4),
    /// the configuration every test and headless run uses.
    pub fn new(pvr_val: u32, include_601_ops: bool, tb_freq_hz: u64) -> Result<Self, InitError> {
        let clock = VirtualClock::new(
            ClockMode::Deterministic { icnt_factor: 4 },
            Arc::new(SystemClock::new()),
        );
        Self::with_clock(pvr_val, include_601_ops, tb_freq_hz, clock)
    }

    /// Build a core following the host clock in real time.
    pub fn new_realtime(
        pvr_val: u32,
        include_601_ops: bool,
        tb_freq_hz: u64,
        host: Arc<dyn HostClock>,
    ) -> Result<Self, InitError> {
        Self::with_clock(
            pvr_val,
            include_601_ops,
            tb_freq_hz,
            VirtualClock::new(ClockMode::Wallclock, host),
        )
    }

    pub fn with_clock(
        pvr_val: u32,
        include_601_ops: bool,
        tb_freq_hz: u64,
        clock: VirtualClock,
    ) -> Result<Self, InitError> {
        if !pvr::supported(pvr_val) {
            return Err(InitError::UnsupportedPvr { pvr: pvr_val });
        }
        if tb_freq_hz == 0 || tb_freq_hz >= gossamer_time::NS_PER_SEC {
            return Err(InitError::BadTbFrequency { hz: tb_freq_hz });
        }

        let is_601 = pvr::is_601(pvr_val);
        let include_601 = !is_601 && include_601_ops;

        let mut cpu = Self {
            state: ProcessorState::default(),
            time: TimeBase::new(clock, tb_freq_hz),
            stats: ExecStats::default(),
            events: TimerQueue::new(),
            table: dispatch::build_table(is_601, include_601),
            is_601,
            include_601,
            ibat: [BatEntry::default(); 4],
            dbat: [BatEntry::default(); 4],
            itlb: None,
            dtlb_read: None,
            dtlb_write: None,
            block_epoch: 0,
            block: threaded::BlockCache::new(),
            exec_flags: ExecFlags::empty(),
            nia: 0,
            icycles: 0,
            power_on: false,
            power_off_reason: PowerOff::Halted,
            int_pin: false,
            dec_pending: false,
            dec_timer: None,
            timer_dirty: false,
            ctx_sync_actions: Vec::new(),
        };
        cpu.state.spr[spr::PVR] = pvr_val;
        cpu.arch_reset();
        interp::set_host_rounding(0);
        Ok(cpu)
    }

    fn arch_reset(&mut self) {
        let pvr_val = self.state.spr[spr::PVR];
        self.state = ProcessorState::default();
        self.state.spr[spr::PVR] = pvr_val;
        if self.is_601 {
            // The 601 powers up with machine-check enabled.
            self.state.msr = msr::ME | msr::IP;
        } else {
            self.state.msr = msr::IP;
            self.state.spr[spr::DEC_S] = 0xFFFF_FFFF;
        }
        self.state.pc = 0xFFF0_0100;
        self.ibat = [BatEntry::default(); 4];
        self.dbat = [BatEntry::default(); 4];
        self.flush_translation_caches();
        self.int_pin = false;
        self.dec_pending = false;
        if let Some(id) = self.dec_timer.take() {
            self.events.cancel(id);
        }
        self.exec_flags = ExecFlags::empty();
    }

    /// Soft reset: registers, MMU state and the time base restart; the
    /// memory map is untouched.
    pub fn reset(&mut self) {
        self.arch_reset();
        self.icycles = 0;
        self.time.reset();
        self.events.clear();
        self.dec_timer = None;
        self.stats = ExecStats::default();
    }

    // ------------------------------------------------------------- power

    pub fn power_off(&mut self) {
        self.power_on = false;
        self.power_off_reason = PowerOff::Halted;
    }

    pub(crate) fn stop(&mut self, reason: PowerOff) {
        self.power_on = false;
        self.power_off_reason = reason;
    }

    pub fn is_powered_on(&self) -> bool {
        self.power_on
    }

    /// True when the POWER instruction group is in the dispatch table:
    /// on a 601, or when requested at init for later cores.
    pub fn has_601_ops(&self) -> bool {
        self.is_601 || self.include_601
    }

    pub(crate) fn power_on_flag(&mut self, on: bool) {
        self.power_on = on;
    }

    pub(crate) fn off_reason(&self) -> PowerOff {
        self.power_off_reason
    }

    // --------------------------------------------------- interrupt lines

    /// Latch the external-interrupt pin. Sampled at the next instruction
    /// boundary when MSR[EE] permits.
    pub fn assert_ext_int(&mut self) {
        self.int_pin = true;
    }

    pub fn release_ext_int(&mut self) {
        self.int_pin = false;
    }

    pub fn ext_int_asserted(&self) -> bool {
        self.int_pin
    }

    // ------------------------------------------------------------ timers

    pub fn now_ns(&self) -> u64 {
        self.time.now_ns(self.icycles)
    }

    /// Register a one-shot event `delta_ns` of virtual time from now.
    pub fn add_oneshot(&mut self, delta_ns: u64, ev: CpuEvent) -> TimerId {
        let now = self.now_ns();
        self.timer_dirty = true;
        self.events.add_oneshot(now, delta_ns, ev)
    }

    pub fn cancel_oneshot(&mut self, id: TimerId) {
        self.events.cancel(id);
    }

    // ----------------------------------------------- context sync queue

    pub fn add_ctx_sync_action(&mut self, action: CtxSyncAction) {
        self.ctx_sync_actions.push(action);
    }

    pub(crate) fn do_ctx_sync(&mut self) {
        while let Some(action) = self.ctx_sync_actions.pop() {
            match action {
                CtxSyncAction::MmuModeReload => self.on_mode_changed(),
            }
        }
    }

    // ------------------------------------------------------------- debug

    /// Disassemble the instruction at `pc`. A fetch fault is reported as
    /// text and leaves no architectural trace.
    pub fn disasm_at(&mut self, bus: &mut AddressMap, pc: u32, simplified: bool) -> String {
        let saved_msr = self.state.msr;
        let saved_srr = (self.state.spr[spr::SRR0], self.state.spr[spr::SRR1]);
        let saved_nia = self.nia;
        let saved_exceptions = self.stats.exceptions;
        match self.fetch_instr(bus, pc) {
            Ok(op) => gossamer_disasm::disasm(pc, op, simplified),
            Err(_) => {
                self.state.msr = saved_msr;
                self.state.spr[spr::SRR0] = saved_srr.0;
                self.state.spr[spr::SRR1] = saved_srr.1;
                self.nia = saved_nia;
                self.stats.exceptions = saved_exceptions;
                format!("<fetch fault at {pc:#010X}>")
            }
        }
    }
}
