//! The architected exception engine.
//!
//! `Cpu::raise` commits SRR0/SRR1, reshapes the MSR and computes the vector
//! address, then hands back an [`Exception`] token. Instruction handlers
//! return it through `Result`, which unwinds the interpreter's inner loop;
//! the outer loop lands by loading PC from the vector recorded here. All
//! side effects the faulting instruction performed before the fault remain
//! visible, and nothing after the raise point runs.

use crate::state::{msr, spr};
use crate::Cpu;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    SystemReset,
    MachineCheck,
    Dsi,
    Isi,
    External,
    Alignment,
    Program,
    FpUnavailable,
    Decrementer,
    Syscall,
    Trace,
}

impl ExceptionKind {
    pub fn vector_offset(self) -> u32 {
        match self {
            ExceptionKind::SystemReset => 0x0100,
            ExceptionKind::MachineCheck => 0x0200,
            ExceptionKind::Dsi => 0x0300,
            ExceptionKind::Isi => 0x0400,
            ExceptionKind::External => 0x0500,
            ExceptionKind::Alignment => 0x0600,
            ExceptionKind::Program => 0x0700,
            ExceptionKind::FpUnavailable => 0x0800,
            ExceptionKind::Decrementer => 0x0900,
            ExceptionKind::Syscall => 0x0C00,
            ExceptionKind::Trace => 0x0D00,
        }
    }
}

/// SRR1 cause bits.
pub mod cause {
    /// Program exception: enabled floating-point exception.
    pub const FP_ENABLED: u32 = 0x0010_0000;
    /// Program exception: illegal instruction.
    pub const ILLEGAL: u32 = 0x0008_0000;
    /// Program exception: privileged instruction in user mode.
    pub const PRIVILEGED: u32 = 0x0004_0000;
    /// Program exception: trap taken.
    pub const TRAP: u32 = 0x0002_0000;
    /// ISI: translation miss.
    pub const ISI_PAGE_FAULT: u32 = 0x4000_0000;
    /// ISI: no-execute or direct-store segment.
    pub const ISI_NO_EXEC: u32 = 0x1000_0000;
    /// ISI: protection violation.
    pub const ISI_PROT: u32 = 0x0800_0000;
    /// Syscall marker bit saved into SRR1.
    pub const SYSCALL: u32 = 0x0002_0000;
}

/// Marker that an exception has been committed to architected state.
#[derive(Debug)]
#[must_use]
pub struct Exception {
    pub kind: ExceptionKind,
}

impl Cpu {
    /// Raise an exception whose SRR0 follows the architected rule for its
    /// kind: faulting instruction for synchronous kinds, next instruction
    /// for ISI/external, instruction after the faulting one for
    /// decrementer, syscall and trace.
    pub(crate) fn raise(&mut self, kind: ExceptionKind, srr1_bits: u32) -> Exception {
        let srr0 = match kind {
            ExceptionKind::Isi | ExceptionKind::External => self.state.pc,
            ExceptionKind::Decrementer | ExceptionKind::Syscall | ExceptionKind::Trace => {
                (self.state.pc & !3).wrapping_add(4)
            }
            _ => self.state.pc & !3,
        };
        self.raise_with_srr0(kind, srr1_bits, srr0)
    }

    /// Raise with an explicit saved PC, used when the natural resume point
    /// is not derivable from the CIA (e.g. an interrupt replayed by `mtmsr`
    /// or `rfi`).
    pub(crate) fn raise_with_srr0(
        &mut self,
        kind: ExceptionKind,
        srr1_bits: u32,
        srr0: u32,
    ) -> Exception {
        self.stats.exceptions += 1;

        let old_msr = self.state.msr;
        self.state.spr[spr::SRR0] = srr0;
        self.state.spr[spr::SRR1] = (old_msr & msr::RFI_MASK) | srr1_bits;

        let mut new_msr = old_msr & !msr::EXC_CLEAR;
        new_msr = (new_msr & !msr::LE) | ((new_msr >> 16) & 1); // LE <- ILE
        self.state.msr = new_msr;

        // Exception entry changes translation context (IR/DR cleared).
        self.mmu_mode_changed();

        let base = if new_msr & msr::IP != 0 { 0xFFF0_0000 } else { 0 };
        self.nia = base | kind.vector_offset();
        log::trace!(
            "exception {:?} srr0={:#010X} srr1={:#010X} vector={:#010X}",
            kind,
            srr0,
            self.state.spr[spr::SRR1],
            self.nia
        );
        Exception { kind }
    }
}
