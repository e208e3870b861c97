//! Predecoded threaded executor.
//!
//! `predecode` walks a basic block starting at PC and builds an array of
//! [`CachedInstr`] entries, a pre-resolved handler plus already-decoded
//! operand fields, then the executor walks the array through function
//! pointers until a terminator commits the PC. Blocks never cross a page,
//! so one successful fetch validates the whole walk; any event that could
//! change the page's translation bumps `block_epoch` and forces a rebuild.
//!
//! The decoded subset covers the hot integer/load/store/branch mix; the
//! first unsupported instruction terminates the block and the canonical
//! interpreter picks up from there, so both engines always agree on
//! architected state.

use memory::{AddressMap, MemValue};

use crate::exceptions::Exception;
use crate::interp::integer::rot_mask;
use crate::state::{spr, xer};
use crate::vmem::PAGE_MASK;
use crate::Cpu;

const BLOCK_CAP: usize = 256;

enum Next {
    Step,
    /// Relative move within the entry array.
    Jump(i32),
    /// Leave the block with PC set to the given address.
    Exit(u32),
}

type ThreadedFn = fn(&mut Cpu, &mut AddressMap, &CachedInstr) -> Result<Next, Exception>;

/// One predecoded instruction.
#[derive(Clone, Copy)]
pub struct CachedInstr {
    handler: ThreadedFn,
    d1: u8,
    d2: u8,
    d3: u8,
    d4: u8,
    uimm: u32,
    simm: i32,
    /// Branch displacement in entries, relative to this one.
    bt: i32,
}

impl CachedInstr {
    fn new(handler: ThreadedFn) -> Self {
        Self { handler, d1: 0, d2: 0, d3: 0, d4: 0, uimm: 0, simm: 0, bt: 0 }
    }
}

pub(crate) struct BlockCache {
    base: u32,
    epoch: u32,
    valid: bool,
    code: Vec<CachedInstr>,
}

impl BlockCache {
    pub(crate) fn new() -> Self {
        Self { base: 0, epoch: 0, valid: false, code: Vec::with_capacity(BLOCK_CAP) }
    }

    fn matches(&self, pc: u32, epoch: u32) -> bool {
        self.valid && self.base == pc && self.epoch == epoch
    }
}

// --------------------------------------------------------- entry handlers

fn op_addi(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let base = if c.d2 == 0 { 0 } else { cpu.state.gpr[c.d2 as usize] };
    cpu.state.gpr[c.d1 as usize] = base.wrapping_add(c.simm as u32);
    Ok(Next::Step)
}

fn op_addic(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let a = cpu.state.gpr[c.d2 as usize];
    let result = a.wrapping_add(c.simm as u32);
    cpu.state.set_ca(result < a);
    if c.d4 != 0 {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[c.d1 as usize] = result;
    Ok(Next::Step)
}

fn op_adde(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let a = cpu.state.gpr[c.d2 as usize];
    let b = cpu.state.gpr[c.d3 as usize];
    let ca = cpu.state.ca() as u32;
    let result = a.wrapping_add(b).wrapping_add(ca);
    cpu.state.set_ca(result < a || (ca != 0 && result == a));
    cpu.state.gpr[c.d1 as usize] = result;
    Ok(Next::Step)
}

fn op_addze(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let a = cpu.state.gpr[c.d2 as usize];
    let result = a.wrapping_add(cpu.state.ca() as u32);
    cpu.state.set_ca(result < a);
    cpu.state.gpr[c.d1 as usize] = result;
    Ok(Next::Step)
}

fn op_mulli(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let product = i64::from(cpu.state.gpr[c.d2 as usize] as i32) * i64::from(c.simm);
    cpu.state.gpr[c.d1 as usize] = product as u32;
    Ok(Next::Step)
}

fn op_andi_rc(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let result = cpu.state.gpr[c.d1 as usize] & c.uimm;
    cpu.state.set_cr0(result);
    cpu.state.gpr[c.d2 as usize] = result;
    Ok(Next::Step)
}

fn op_ori(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.gpr[c.d2 as usize] = cpu.state.gpr[c.d1 as usize] | c.uimm;
    Ok(Next::Step)
}

fn op_xori(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.gpr[c.d2 as usize] = cpu.state.gpr[c.d1 as usize] ^ c.uimm;
    Ok(Next::Step)
}

fn op_rlwinm(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let result = cpu.state.gpr[c.d1 as usize].rotate_left(u32::from(c.d3)) & c.uimm;
    if c.d4 != 0 {
        cpu.state.set_cr0(result);
    }
    cpu.state.gpr[c.d2 as usize] = result;
    Ok(Next::Step)
}

fn op_srawi_rc(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let s = cpu.state.gpr[c.d1 as usize];
    cpu.state.set_ca((s as i32) < 0 && s & c.uimm != 0);
    let result = ((s as i32) >> c.d3) as u32;
    cpu.state.set_cr0(result);
    cpu.state.gpr[c.d2 as usize] = result;
    Ok(Next::Step)
}

fn op_cmpi(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let a = cpu.state.gpr[c.d2 as usize] as i32;
    let bits = if a == c.simm { 0b0010 } else if a > c.simm { 0b0100 } else { 0b1000 };
    let so = (cpu.state.xer() & xer::SO != 0) as u32;
    cpu.state.set_cr_field(u32::from(c.d1), bits | so);
    Ok(Next::Step)
}

fn op_cmpli(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let a = cpu.state.gpr[c.d2 as usize];
    let b = c.uimm;
    let bits = if a == b { 0b0010 } else if a > b { 0b0100 } else { 0b1000 };
    let so = (cpu.state.xer() & xer::SO != 0) as u32;
    cpu.state.set_cr_field(u32::from(c.d1), bits | so);
    Ok(Next::Step)
}

fn load_ea(cpu: &Cpu, c: &CachedInstr) -> u32 {
    let base = if c.d2 == 0 { 0 } else { cpu.state.gpr[c.d2 as usize] };
    base.wrapping_add(c.simm as u32)
}

fn op_lz<T: MemValue>(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = load_ea(cpu, c);
    let val = cpu.read_vmem::<T>(bus, ea)?;
    cpu.state.gpr[c.d1 as usize] = val.to_u64() as u32;
    Ok(Next::Step)
}

fn op_lzu<T: MemValue>(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = cpu.state.gpr[c.d2 as usize].wrapping_add(c.simm as u32);
    let val = cpu.read_vmem::<T>(bus, ea)?;
    cpu.state.gpr[c.d1 as usize] = val.to_u64() as u32;
    cpu.state.gpr[c.d2 as usize] = ea;
    Ok(Next::Step)
}

fn op_lha(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = load_ea(cpu, c);
    let val = cpu.read_vmem::<u16>(bus, ea)?;
    cpu.state.gpr[c.d1 as usize] = val as i16 as i32 as u32;
    Ok(Next::Step)
}

fn op_lhau(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = cpu.state.gpr[c.d2 as usize].wrapping_add(c.simm as u32);
    let val = cpu.read_vmem::<u16>(bus, ea)?;
    cpu.state.gpr[c.d1 as usize] = val as i16 as i32 as u32;
    cpu.state.gpr[c.d2 as usize] = ea;
    Ok(Next::Step)
}

fn op_st<T: MemValue>(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = load_ea(cpu, c);
    cpu.write_vmem::<T>(bus, ea, T::from_u64(u64::from(cpu.state.gpr[c.d1 as usize])))?;
    Ok(Next::Step)
}

fn op_stu<T: MemValue>(cpu: &mut Cpu, bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let ea = cpu.state.gpr[c.d2 as usize].wrapping_add(c.simm as u32);
    cpu.write_vmem::<T>(bus, ea, T::from_u64(u64::from(cpu.state.gpr[c.d1 as usize])))?;
    cpu.state.gpr[c.d2 as usize] = ea;
    Ok(Next::Step)
}

fn op_mtspr(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.spr[c.uimm as usize] = cpu.state.gpr[c.d1 as usize];
    Ok(Next::Step)
}

fn op_mfspr(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.gpr[c.d1 as usize] = cpu.state.spr[c.uimm as usize];
    Ok(Next::Step)
}

/// Conditional branch on a CR bit; `d4` selects branch-if-set.
fn op_bc(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    let set = cpu.state.cr & c.uimm != 0;
    if set == (c.d4 != 0) {
        Ok(Next::Jump(c.bt))
    } else {
        Ok(Next::Step)
    }
}

fn op_bdnz(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.spr[spr::CTR] = cpu.state.spr[spr::CTR].wrapping_sub(1);
    if cpu.state.spr[spr::CTR] != 0 {
        Ok(Next::Jump(c.bt))
    } else {
        Ok(Next::Step)
    }
}

fn op_bdz(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.spr[spr::CTR] = cpu.state.spr[spr::CTR].wrapping_sub(1);
    if cpu.state.spr[spr::CTR] == 0 {
        Ok(Next::Jump(c.bt))
    } else {
        Ok(Next::Step)
    }
}

/// Unconditional branch out of the block; target computed at predecode.
fn op_bexit(_cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    Ok(Next::Exit(c.uimm))
}

fn op_bexit_link(cpu: &mut Cpu, _bus: &mut AddressMap, c: &CachedInstr) -> Result<Next, Exception> {
    cpu.state.spr[spr::LR] = cpu.state.pc.wrapping_add(4);
    Ok(Next::Exit(c.uimm))
}

fn op_blr(cpu: &mut Cpu, _bus: &mut AddressMap, _c: &CachedInstr) -> Result<Next, Exception> {
    Ok(Next::Exit(cpu.state.spr[spr::LR] & !3))
}

/// Commit the PC of an instruction the predecoder does not handle; the
/// canonical interpreter resumes there.
fn op_commit_exit(cpu: &mut Cpu, _bus: &mut AddressMap, _c: &CachedInstr) -> Result<Next, Exception> {
    Ok(Next::Exit(cpu.state.pc))
}

// -------------------------------------------------------------- predecode

/// Decode one instruction into a cache entry. `pc` is the instruction's
/// address. Returns `None` for instructions outside the subset.
fn decode_one(opcode: u32, pc: u32) -> Option<(CachedInstr, bool)> {
    let d = ((opcode >> 21) & 31) as u8;
    let a = ((opcode >> 16) & 31) as u8;
    let b = ((opcode >> 11) & 31) as u8;
    let simm = opcode as u16 as i16 as i32;
    let uimm = u32::from(opcode as u16);
    let rc = (opcode & 1) as u8;

    let mut c;
    let mut terminator = false;

    match opcode >> 26 {
        7 => {
            c = CachedInstr::new(op_mulli);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        10 => {
            c = CachedInstr::new(op_cmpli);
            c.d1 = ((opcode >> 23) & 7) as u8;
            c.d2 = a;
            c.uimm = uimm;
        }
        11 => {
            c = CachedInstr::new(op_cmpi);
            c.d1 = ((opcode >> 23) & 7) as u8;
            c.d2 = a;
            c.simm = simm;
        }
        12 | 13 => {
            c = CachedInstr::new(op_addic);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
            c.d4 = ((opcode >> 26) & 1) as u8; // opcode 13 is addic.
        }
        14 => {
            c = CachedInstr::new(op_addi);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        15 => {
            c = CachedInstr::new(op_addi);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm << 16;
        }
        16 => {
            let bo = u32::from(d);
            let bi = u32::from(a);
            if opcode & 3 != 0 {
                return None; // AA/LK conditional forms stay canonical
            }
            let bt = (simm & !3) >> 2;
            match bo & 0x1E {
                4 | 6 => {
                    c = CachedInstr::new(op_bc);
                    c.uimm = 0x8000_0000 >> bi;
                    c.d4 = 0;
                    c.bt = bt;
                }
                12 | 14 => {
                    c = CachedInstr::new(op_bc);
                    c.uimm = 0x8000_0000 >> bi;
                    c.d4 = 1;
                    c.bt = bt;
                }
                16 => {
                    c = CachedInstr::new(op_bdnz);
                    c.bt = bt;
                }
                18 => {
                    c = CachedInstr::new(op_bdz);
                    c.bt = bt;
                }
                _ => return None,
            }
        }
        18 => {
            if opcode & 2 != 0 {
                return None; // absolute forms stay canonical
            }
            let li = (((opcode & !3) << 6) as i32) >> 6;
            c = CachedInstr::new(if opcode & 1 != 0 { op_bexit_link } else { op_bexit });
            c.uimm = pc.wrapping_add(li as u32);
            terminator = true;
        }
        19 => {
            // blr only (bclr 20,0, LK=0).
            if (opcode >> 1) & 0x3FF == 16 && d & 0x14 == 0x14 && opcode & 1 == 0 {
                c = CachedInstr::new(op_blr);
                terminator = true;
            } else {
                return None;
            }
        }
        21 => {
            c = CachedInstr::new(op_rlwinm);
            c.d1 = d;
            c.d2 = a;
            c.d3 = b;
            c.d4 = rc;
            c.uimm = rot_mask((opcode >> 6) & 31, (opcode >> 1) & 31);
        }
        24 => {
            c = CachedInstr::new(op_ori);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm;
        }
        25 => {
            c = CachedInstr::new(op_ori);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm << 16;
        }
        26 => {
            c = CachedInstr::new(op_xori);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm;
        }
        27 => {
            c = CachedInstr::new(op_xori);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm << 16;
        }
        28 => {
            c = CachedInstr::new(op_andi_rc);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm;
        }
        29 => {
            c = CachedInstr::new(op_andi_rc);
            c.d1 = d;
            c.d2 = a;
            c.uimm = uimm << 16;
        }
        31 => {
            let ext = (opcode >> 1) & 0x3FF;
            match ext {
                138 if opcode & 0x401 == 0 => {
                    c = CachedInstr::new(op_adde);
                    c.d1 = d;
                    c.d2 = a;
                    c.d3 = b;
                }
                202 if opcode & 0x401 == 0 => {
                    c = CachedInstr::new(op_addze);
                    c.d1 = d;
                    c.d2 = a;
                }
                824 if rc == 1 => {
                    c = CachedInstr::new(op_srawi_rc);
                    c.d1 = d;
                    c.d2 = a;
                    c.d3 = b;
                    c.uimm = (1u32 << b) - 1;
                }
                339 | 467 => {
                    // LR/CTR/SPRG moves have no side effects worth the
                    // canonical path.
                    let sprn = (u32::from(b) << 5) | u32::from(a);
                    let plain = matches!(sprn as usize, spr::LR | spr::CTR)
                        || (spr::SPRG0..=spr::SPRG3).contains(&(sprn as usize));
                    if !plain {
                        return None;
                    }
                    c = CachedInstr::new(if ext == 339 { op_mfspr } else { op_mtspr });
                    c.d1 = d;
                    c.uimm = sprn;
                }
                _ => return None,
            }
        }
        32 => {
            c = CachedInstr::new(op_lz::<u32>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        33 => {
            if a == 0 || a == d {
                return None;
            }
            c = CachedInstr::new(op_lzu::<u32>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        34 => {
            c = CachedInstr::new(op_lz::<u8>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        35 => {
            if a == 0 || a == d {
                return None;
            }
            c = CachedInstr::new(op_lzu::<u8>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        36 => {
            c = CachedInstr::new(op_st::<u32>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        37 => {
            if a == 0 {
                return None;
            }
            c = CachedInstr::new(op_stu::<u32>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        38 => {
            c = CachedInstr::new(op_st::<u8>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        39 => {
            if a == 0 {
                return None;
            }
            c = CachedInstr::new(op_stu::<u8>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        40 => {
            c = CachedInstr::new(op_lz::<u16>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        41 => {
            if a == 0 || a == d {
                return None;
            }
            c = CachedInstr::new(op_lzu::<u16>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        42 => {
            c = CachedInstr::new(op_lha);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        43 => {
            if a == 0 || a == d {
                return None;
            }
            c = CachedInstr::new(op_lhau);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        44 => {
            c = CachedInstr::new(op_st::<u16>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        45 => {
            if a == 0 {
                return None;
            }
            c = CachedInstr::new(op_stu::<u16>);
            c.d1 = d;
            c.d2 = a;
            c.simm = simm;
        }
        _ => return None,
    }
    Some((c, terminator))
}

impl Cpu {
    /// Build the block cache for the current PC. Returns false when the
    /// first instruction is outside the subset (canonical path handles it).
    fn predecode_block(&mut self, bus: &mut AddressMap) -> Result<bool, Exception> {
        let base = self.state.pc;
        let page_end = (base & PAGE_MASK) + crate::vmem::PAGE_SIZE;
        let mut pc = base;
        let mut closed = false;

        self.block.valid = false;
        self.block.code.clear();

        while pc < page_end && self.block.code.len() < BLOCK_CAP - 1 {
            let opcode = self.fetch_instr(bus, pc)?;
            match decode_one(opcode, pc) {
                Some((entry, terminator)) => {
                    self.block.code.push(entry);
                    if terminator {
                        closed = true;
                        break;
                    }
                }
                None => {
                    if self.block.code.is_empty() {
                        return Ok(false);
                    }
                    self.block.code.push(CachedInstr::new(op_commit_exit));
                    closed = true;
                    break;
                }
            }
            pc = pc.wrapping_add(4);
        }
        if self.block.code.is_empty() {
            return Ok(false);
        }
        // A block cut short by the page or capacity limit still needs a
        // clean hand-off.
        if !closed {
            self.block.code.push(CachedInstr::new(op_commit_exit));
        }
        self.block.base = base;
        self.block.epoch = self.block_epoch;
        self.block.valid = true;
        Ok(true)
    }

    /// Run one predecoded block at PC. Returns Ok(false) when the block's
    /// first instruction is outside the subset.
    pub(crate) fn try_threaded_block(
        &mut self,
        bus: &mut AddressMap,
        max_cycles: &mut u64,
    ) -> Result<bool, Exception> {
        if !self.block.matches(self.state.pc, self.block_epoch)
            && !self.predecode_block(bus)?
        {
            return Ok(false);
        }

        let base = self.block.base;
        let len = self.block.code.len();
        let mut idx = 0usize;

        loop {
            let entry = self.block.code[idx];
            // Committed before the body so a faulting entry reports the
            // right CIA, exactly like the canonical loop.
            self.state.pc = base.wrapping_add((idx as u32) * 4);
            let next = (entry.handler)(self, bus, &entry)?;

            self.stats.instrs += 1;
            self.icycles += 1;
            if self.icycles >= *max_cycles || self.timer_dirty {
                *max_cycles = self.process_events(bus);
            }

            match next {
                Next::Step => idx += 1,
                Next::Jump(delta) => {
                    let target = idx as i64 + i64::from(delta);
                    if (0..len as i64).contains(&target) {
                        idx = target as usize;
                    } else {
                        // Branch leaves the decoded window.
                        self.state.pc =
                            base.wrapping_add((target as i32).wrapping_mul(4) as u32);
                        break;
                    }
                }
                Next::Exit(pc) => {
                    self.state.pc = pc;
                    break;
                }
            }
            if idx >= len {
                self.state.pc = base.wrapping_add((idx as u32) * 4);
                break;
            }
            // Interrupt lines pending with EE set end the block so the
            // boundary logic can vector; a tight spin inside the entry
            // array must not starve them.
            if self.state.msr & crate::state::msr::EE != 0 && (self.int_pin || self.dec_pending) {
                self.state.pc = base.wrapping_add((idx as u32) * 4);
                break;
            }
        }
        Ok(true)
    }

    /// Execute one basic block through the predecoded engine, taking the
    /// canonical path for a first instruction outside the subset. Exposed
    /// for equivalence testing and the `dtc` feature's run loop.
    pub fn step_block_threaded(&mut self, bus: &mut AddressMap) -> bool {
        let mut max_cycles = 0u64;
        match self.try_threaded_block(bus, &mut max_cycles) {
            Ok(handled) => handled,
            Err(_) => {
                self.state.pc = self.nia;
                true
            }
        }
    }
}
