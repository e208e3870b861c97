//! Virtual-memory access for the core: BAT + segment/page-table translation
//! with per-channel last-hit caches, the alignment model, and typed guest
//! reads and writes routed to RAM/ROM or MMIO.

use gossamer_mmu::{bat_lookup, translate_page, BatEntry, BatResult, PageTableMem, WalkError};
use memory::{AddressMap, MemValue, RangeKind, RegionId};

use crate::exceptions::{cause, Exception, ExceptionKind};
use crate::state::{msr, spr};
use crate::Cpu;

pub(crate) const PAGE_SIZE: u32 = gossamer_mmu::PAGE_SIZE;
pub(crate) const PAGE_MASK: u32 = gossamer_mmu::PAGE_MASK;

/// One translation channel's last hit: a guest page mapped onto a region
/// of the address map.
#[derive(Clone, Copy)]
pub(crate) struct TlbEntry {
    va_page: u32,
    phys_page: u32,
    region: RegionId,
    region_start: u32,
    kind: RangeKind,
    /// Whole page backed by one ROM/RAM region: direct reads are safe.
    direct: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Channel {
    Fetch,
    Read,
    Write,
}

/// Page-table view over the physical address map.
struct PtView<'a> {
    bus: &'a mut AddressMap,
}

impl PageTableMem for PtView<'_> {
    fn read_u32(&mut self, pa: u32) -> Option<u32> {
        let hit = self.bus.resolve(pa)?;
        match hit.kind {
            RangeKind::Ram | RangeKind::Rom => Some(self.bus.mem_read::<u32>(hit.id, pa - hit.start)),
            RangeKind::Mmio => None,
        }
    }

    fn write_u32(&mut self, pa: u32, val: u32) {
        if let Some(hit) = self.bus.resolve(pa) {
            if hit.kind == RangeKind::Ram {
                self.bus.mem_write::<u32>(hit.id, pa - hit.start, val);
            }
        }
    }
}

impl Cpu {
    // ------------------------------------------------------ invalidation

    pub(crate) fn flush_translation_caches(&mut self) {
        self.itlb = None;
        self.dtlb_read = None;
        self.dtlb_write = None;
        self.block_epoch = self.block_epoch.wrapping_add(1);
    }

    /// Segment registers or SDR1 changed.
    pub fn on_pat_ctx_changed(&mut self) {
        self.flush_translation_caches();
    }

    /// MSR[IR]/MSR[DR] (or privilege) may have changed.
    pub fn on_mode_changed(&mut self) {
        self.flush_translation_caches();
    }

    pub(crate) fn mmu_mode_changed(&mut self) {
        self.flush_translation_caches();
    }

    pub fn flush_tlb_entry(&mut self, _ea: u32) {
        // Three single-entry channels: any tlbie drops them all.
        self.flush_translation_caches();
    }

    /// Rebuild the derived BAT array on a BAT SPR write. The whole side is
    /// rebuilt; entries whose valid bits are clear stop matching.
    pub(crate) fn bat_updated(&mut self, reg: usize) {
        if (spr::IBAT0U..=spr::IBAT3L).contains(&reg) {
            for i in 0..4 {
                self.ibat[i] = BatEntry::from_pair(
                    self.state.spr[spr::IBAT0U + 2 * i],
                    self.state.spr[spr::IBAT0U + 2 * i + 1],
                );
            }
        } else {
            for i in 0..4 {
                self.dbat[i] = BatEntry::from_pair(
                    self.state.spr[spr::DBAT0U + 2 * i],
                    self.state.spr[spr::DBAT0U + 2 * i + 1],
                );
            }
        }
        self.flush_translation_caches();
    }

    // -------------------------------------------------------- translation

    fn isi_for(&mut self, err: WalkError) -> Exception {
        let bits = match err {
            WalkError::PageFault => cause::ISI_PAGE_FAULT,
            WalkError::Protection => cause::ISI_PROT,
            WalkError::NoExecute | WalkError::DirectStore => cause::ISI_NO_EXEC,
            WalkError::NoPageTable => return self.raise(ExceptionKind::MachineCheck, 0),
        };
        self.raise(ExceptionKind::Isi, bits)
    }

    fn dsi_for(&mut self, ea: u32, write: bool, dsisr: u32) -> Exception {
        self.state.spr[spr::DSISR] = dsisr | ((write as u32) << 25);
        self.state.spr[spr::DAR] = ea;
        self.raise(ExceptionKind::Dsi, 0)
    }

    /// Translate an instruction-fetch address to a physical address.
    pub fn translate_instr(&mut self, bus: &mut AddressMap, ea: u32) -> Result<u32, Exception> {
        if self.state.msr & msr::IR == 0 {
            return Ok(ea);
        }
        let user = !self.state.supervisor();
        match bat_lookup(&self.ibat, ea, user, false) {
            BatResult::Hit(pa) => Ok(pa),
            BatResult::Protection => Err(self.raise(ExceptionKind::Isi, cause::ISI_PROT)),
            BatResult::Miss => {
                let sr_val = self.state.sr[(ea >> 28) as usize];
                let sdr1 = self.state.spr[spr::SDR1];
                let mut view = PtView { bus };
                translate_page(&mut view, sdr1, sr_val, ea, true, user, false)
                    .map(|w| w.pa)
                    .map_err(|e| self.isi_for(e))
            }
        }
    }

    /// Translate a data access. `write` selects the checked permission.
    pub fn translate_data(
        &mut self,
        bus: &mut AddressMap,
        ea: u32,
        write: bool,
    ) -> Result<u32, Exception> {
        if self.state.msr & msr::DR == 0 {
            return Ok(ea);
        }
        let user = !self.state.supervisor();
        match bat_lookup(&self.dbat, ea, user, write) {
            BatResult::Hit(pa) => Ok(pa),
            BatResult::Protection => Err(self.dsi_for(ea, write, 0x0800_0000)),
            BatResult::Miss => {
                let sr_val = self.state.sr[(ea >> 28) as usize];
                let sdr1 = self.state.spr[spr::SDR1];
                let mut view = PtView { bus };
                match translate_page(&mut view, sdr1, sr_val, ea, false, user, write) {
                    Ok(w) => Ok(w.pa),
                    Err(WalkError::PageFault) => Err(self.dsi_for(ea, write, 0x4000_0000)),
                    Err(WalkError::Protection) => Err(self.dsi_for(ea, write, 0x0800_0000)),
                    Err(WalkError::DirectStore) => {
                        log::warn!("direct-store access at {ea:#010X} is not supported");
                        Err(self.dsi_for(ea, write, 0x0400_0000))
                    }
                    Err(WalkError::NoExecute) => unreachable!("no-execute is fetch-only"),
                    Err(WalkError::NoPageTable) => Err(self.raise(ExceptionKind::MachineCheck, 0)),
                }
            }
        }
    }

    fn fill_channel(
        &mut self,
        bus: &mut AddressMap,
        channel: Channel,
        ea: u32,
    ) -> Result<TlbEntry, Exception> {
        let pa = match channel {
            Channel::Fetch => self.translate_instr(bus, ea)?,
            Channel::Read => self.translate_data(bus, ea, false)?,
            Channel::Write => self.translate_data(bus, ea, true)?,
        };
        let Some(hit) = bus.resolve(pa) else {
            if channel == Channel::Fetch {
                log::warn!("instruction fetch from unmapped memory at {pa:#010X}");
                return Err(self.raise(ExceptionKind::MachineCheck, 0));
            }
            // Data access to a hole: modelled as open bus by the caller.
            return Ok(TlbEntry {
                va_page: ea & PAGE_MASK,
                phys_page: pa & PAGE_MASK,
                region: RegionId(u32::MAX),
                region_start: 0,
                kind: RangeKind::Mmio,
                direct: false,
            });
        };
        // MMIO and region-straddling pages are never accessed directly:
        // every access must reach the device / re-resolve.
        let direct = hit.kind != RangeKind::Mmio
            && u64::from(pa & PAGE_MASK) >= u64::from(hit.start)
            && u64::from(pa & PAGE_MASK) + u64::from(PAGE_SIZE) - 1 <= u64::from(hit.end);
        let entry = TlbEntry {
            va_page: ea & PAGE_MASK,
            phys_page: pa & PAGE_MASK,
            region: hit.id,
            region_start: hit.start,
            kind: hit.kind,
            direct,
        };
        if direct {
            match channel {
                Channel::Fetch => self.itlb = Some(entry),
                Channel::Read => self.dtlb_read = Some(entry),
                Channel::Write => self.dtlb_write = Some(entry),
            }
        }
        Ok(entry)
    }

    fn cached(&self, channel: Channel, ea: u32) -> Option<TlbEntry> {
        let slot = match channel {
            Channel::Fetch => self.itlb,
            Channel::Read => self.dtlb_read,
            Channel::Write => self.dtlb_write,
        };
        slot.filter(|t| t.va_page == ea & PAGE_MASK)
    }

    // -------------------------------------------------------------- fetch

    /// Fetch the instruction word at `ea`. At most one translation per
    /// page; same-page fetches hit the instruction channel cache.
    #[inline]
    pub(crate) fn fetch_instr(&mut self, bus: &mut AddressMap, ea: u32) -> Result<u32, Exception> {
        if let Some(t) = self.cached(Channel::Fetch, ea) {
            let offset = (t.phys_page | (ea & !PAGE_MASK)) - t.region_start;
            return Ok(bus.mem_read::<u32>(t.region, offset));
        }
        let t = self.fill_channel(bus, Channel::Fetch, ea)?;
        if t.kind == RangeKind::Mmio {
            log::warn!("instruction fetch from MMIO at {ea:#010X}");
            return Err(self.raise(ExceptionKind::MachineCheck, 0));
        }
        let pa = t.phys_page | (ea & !PAGE_MASK);
        if t.direct {
            Ok(bus.mem_read::<u32>(t.region, pa - t.region_start))
        } else {
            Ok(bus.read_phys::<u32>(pa))
        }
    }

    // ---------------------------------------------------------- alignment

    /// The alignment model: multi-byte accesses must not straddle a word
    /// boundary; doublewords must be doubleword-aligned.
    #[inline]
    fn misaligned(ea: u32, size: usize) -> bool {
        match size {
            1 => false,
            8 => ea & 7 != 0,
            _ => (ea & 3) as usize + size > 4,
        }
    }

    pub(crate) fn alignment_exception(&mut self, ea: u32) -> Exception {
        self.state.spr[spr::DAR] = ea;
        self.raise(ExceptionKind::Alignment, 0)
    }

    /// Word-alignment demanded by lmw/stmw/lwarx/stwcx./eciwx/ecowx.
    pub(crate) fn require_word_aligned(&mut self, ea: u32) -> Result<(), Exception> {
        if ea & 3 != 0 {
            return Err(self.alignment_exception(ea));
        }
        Ok(())
    }

    // ------------------------------------------------------- typed access

    /// Typed guest load through translation.
    pub fn read_vmem<T: MemValue>(&mut self, bus: &mut AddressMap, ea: u32) -> Result<T, Exception> {
        if Self::misaligned(ea, T::SIZE) {
            return Err(self.alignment_exception(ea));
        }
        self.stats.loads += 1;
        let t = match self.cached(Channel::Read, ea) {
            Some(t) => t,
            None => self.fill_channel(bus, Channel::Read, ea)?,
        };
        let pa = t.phys_page | (ea & !PAGE_MASK);
        if t.direct {
            Ok(bus.mem_read::<T>(t.region, pa - t.region_start))
        } else {
            Ok(bus.read_phys::<T>(pa))
        }
    }

    /// Typed guest store through translation.
    pub fn write_vmem<T: MemValue>(
        &mut self,
        bus: &mut AddressMap,
        ea: u32,
        val: T,
    ) -> Result<(), Exception> {
        if Self::misaligned(ea, T::SIZE) {
            return Err(self.alignment_exception(ea));
        }
        self.stats.stores += 1;
        let t = match self.cached(Channel::Write, ea) {
            Some(t) => t,
            None => self.fill_channel(bus, Channel::Write, ea)?,
        };
        let pa = t.phys_page | (ea & !PAGE_MASK);
        if t.direct {
            bus.mem_write::<T>(t.region, pa - t.region_start, val);
        } else {
            bus.write_phys::<T>(pa, val);
        }
        Ok(())
    }
}
