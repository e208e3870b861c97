//! Debugger register access by name: `R0..R31`, `F0..F31`, `SPR0..SPR1023`,
//! `SR0..SR15`, `PC`, `MSR`, `CR`, `FPSCR`, plus the SPR mnemonics.

use thiserror::Error;

use crate::state::spr;
use crate::Cpu;

#[derive(Debug, Error)]
pub enum RegError {
    #[error("unknown register {0:?}")]
    Unknown(String),
}

/// SPR mnemonic table. User-visible aliases resolve to the supervisor slot
/// the core actually keeps current.
fn spr_by_name(name: &str) -> Option<usize> {
    Some(match name {
        "XER" => spr::XER,
        "LR" => spr::LR,
        "CTR" => spr::CTR,
        "DSISR" => spr::DSISR,
        "DAR" => spr::DAR,
        "DEC" => spr::DEC_S,
        "SDR1" => spr::SDR1,
        "SRR0" => spr::SRR0,
        "SRR1" => spr::SRR1,
        "SPRG0" => spr::SPRG0,
        "SPRG1" => spr::SPRG1,
        "SPRG2" => spr::SPRG2,
        "SPRG3" => spr::SPRG3,
        "EAR" => spr::EAR,
        "TBL" => spr::TBL_S,
        "TBU" => spr::TBU_S,
        "PVR" => spr::PVR,
        "MQ" => spr::MQ,
        "RTCU" => spr::RTCU_S,
        "RTCL" => spr::RTCL_S,
        "IBAT0U" => 528,
        "IBAT0L" => 529,
        "IBAT1U" => 530,
        "IBAT1L" => 531,
        "IBAT2U" => 532,
        "IBAT2L" => 533,
        "IBAT3U" => 534,
        "IBAT3L" => 535,
        "DBAT0U" => 536,
        "DBAT0L" => 537,
        "DBAT1U" => 538,
        "DBAT1L" => 539,
        "DBAT2U" => 540,
        "DBAT2L" => 541,
        "DBAT3U" => 542,
        "DBAT3L" => 543,
        "HID0" => spr::HID0,
        "HID1" => spr::HID1,
        "IABR" => spr::IABR,
        "DABR" => spr::DABR,
        "L2CR" => spr::L2CR,
        "ICTC" => spr::ICTC,
        "THRM1" => spr::THRM1,
        "THRM2" => spr::THRM2,
        "THRM3" => spr::THRM3,
        "PIR" => spr::PIR,
        "MMCR0" => spr::MMCR0,
        "MMCR1" => spr::MMCR1,
        "PMC1" => spr::PMC1,
        "PMC2" => spr::PMC2,
        "SIA" => spr::SIA,
        "SDA" => spr::SDA,
        _ => return None,
    })
}

/// User aliases of time-keeping SPRs redirect to the supervisor slots.
fn normalize_spr(num: usize) -> usize {
    match num {
        spr::DEC_U => spr::DEC_S,
        spr::RTCL_U => spr::RTCL_S,
        spr::RTCU_U => spr::RTCU_S,
        spr::TBL_U => spr::TBL_S,
        spr::TBU_U => spr::TBU_S,
        other => other,
    }
}

enum Slot {
    Pc,
    Msr,
    Cr,
    Fpscr,
    Gpr(usize),
    Fpr(usize),
    Spr(usize),
    Sr(usize),
}

fn parse(name: &str) -> Result<Slot, RegError> {
    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
        "PC" => return Ok(Slot::Pc),
        "MSR" => return Ok(Slot::Msr),
        "CR" => return Ok(Slot::Cr),
        "FPSCR" => return Ok(Slot::Fpscr),
        _ => {}
    }
    if let Some(n) = spr_by_name(&upper) {
        return Ok(Slot::Spr(n));
    }
    let numbered = |prefix: &str, limit: usize| -> Option<usize> {
        upper
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse::<usize>().ok())
            .filter(|n| *n < limit)
    };
    if let Some(n) = numbered("SPR", 1024) {
        return Ok(Slot::Spr(normalize_spr(n)));
    }
    if let Some(n) = numbered("SR", 16) {
        return Ok(Slot::Sr(n));
    }
    if let Some(n) = numbered("R", 32) {
        return Ok(Slot::Gpr(n));
    }
    if let Some(n) = numbered("F", 32) {
        return Ok(Slot::Fpr(n));
    }
    Err(RegError::Unknown(name.to_string()))
}

impl Cpu {
    pub fn get_reg(&self, name: &str) -> Result<u64, RegError> {
        Ok(match parse(name)? {
            Slot::Pc => u64::from(self.state.pc),
            Slot::Msr => u64::from(self.state.msr),
            Slot::Cr => u64::from(self.state.cr),
            Slot::Fpscr => u64::from(self.state.fpscr),
            Slot::Gpr(n) => u64::from(self.state.gpr[n]),
            Slot::Fpr(n) => self.state.fpr[n].bits(),
            Slot::Spr(n) => u64::from(self.state.spr[n]),
            Slot::Sr(n) => u64::from(self.state.sr[n]),
        })
    }

    pub fn set_reg(&mut self, name: &str, val: u64) -> Result<(), RegError> {
        match parse(name)? {
            Slot::Pc => self.state.pc = val as u32,
            Slot::Msr => {
                self.state.msr = val as u32;
                self.on_mode_changed();
            }
            Slot::Cr => self.state.cr = val as u32,
            Slot::Fpscr => self.state.fpscr = val as u32,
            Slot::Gpr(n) => self.state.gpr[n] = val as u32,
            Slot::Fpr(n) => self.state.fpr[n] = crate::Fpr::from_bits(val),
            Slot::Spr(n) => {
                self.state.spr[n] = val as u32;
                if (spr::IBAT0U..=spr::DBAT3L).contains(&n) {
                    self.bat_updated(n);
                } else if n == spr::SDR1 {
                    self.on_pat_ctx_changed();
                }
            }
            Slot::Sr(n) => {
                self.state.sr[n] = val as u32;
                self.on_pat_ctx_changed();
            }
        }
        Ok(())
    }

    pub fn dump_regs(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for i in 0..32 {
            let _ = write!(out, "R{i:<2} {:08X}", self.state.gpr[i]);
            out.push(if i % 4 == 3 { '\n' } else { ' ' });
        }
        let _ = writeln!(
            out,
            "PC  {:08X} MSR {:08X} CR  {:08X} FPSCR {:08X}",
            self.state.pc, self.state.msr, self.state.cr, self.state.fpscr
        );
        let _ = writeln!(
            out,
            "LR  {:08X} CTR {:08X} XER {:08X} DEC   {:08X}",
            self.state.spr[spr::LR],
            self.state.spr[spr::CTR],
            self.state.spr[spr::XER],
            self.state.spr[spr::DEC_S]
        );
        let _ = writeln!(
            out,
            "SRR0 {:08X} SRR1 {:08X} DAR {:08X} DSISR {:08X}",
            self.state.spr[spr::SRR0],
            self.state.spr[spr::SRR1],
            self.state.spr[spr::DAR],
            self.state.spr[spr::DSISR]
        );
        out
    }
}
