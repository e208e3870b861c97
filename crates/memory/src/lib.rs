//! Guest physical address space: an ordered set of ROM, RAM and MMIO
//! regions with full and partial mirrors.
//!
//! Guest byte order is big-endian; all typed accessors store and fetch
//! big-endian regardless of the host. Unmapped reads return all-ones and
//! unmapped writes are dropped with a warning; Mac ROMs probe addresses
//! speculatively and must not bring the machine down.

use gossamer_time::InterruptSink;
use thiserror::Error;

mod value;

pub use value::MemValue;

/// Memory-mapped I/O device contract.
///
/// `size` is 1, 2 or 4 (8-byte accesses are split by the map). The value
/// crossing this boundary is the guest's big-endian value already assembled
/// in host-native form. A device may decline an access (`None` / `false`);
/// the map then applies open-bus semantics.
pub trait MmioDevice {
    fn read(&mut self, rgn_start: u32, offset: u32, size: u8) -> Option<u32>;
    fn write(&mut self, rgn_start: u32, offset: u32, value: u32, size: u8) -> bool;

    /// One-shot timer expiry routed by the machine. `cookie` is whatever the
    /// device passed when arming the timer.
    fn on_timer(&mut self, _cookie: u32, _irq: &mut dyn InterruptSink) {}

    fn name(&self) -> &str {
        "mmio-device"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    Rom,
    Ram,
    Mmio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("address range {start:#010X}..={end:#010X} overlaps an existing region")]
    RegionExists { start: u32, end: u32 },
    #[error("no region contains target address {addr:#010X}")]
    NoSuchTarget { addr: u32 },
    #[error("mirror target at {addr:#010X} is an MMIO region")]
    MirrorOfMmio { addr: u32 },
    #[error("region at {start:#010X} has zero length")]
    EmptyRegion { start: u32 },
}

enum Backing {
    Ram(Vec<u8>),
    Rom(Vec<u8>),
    Mmio(Box<dyn MmioDevice>),
    /// Window onto another region's storage. `target_offset` is added to the
    /// in-window offset before indexing the target's bytes.
    Mirror { target: usize, target_offset: u32 },
}

struct Region {
    start: u32,
    end: u32, // inclusive
    backing: Backing,
}

/// Result of an address lookup. `id` names the region that matched (the
/// alias itself for mirrors); `kind` is the effective kind after following
/// the mirror indirection.
#[derive(Clone, Copy, Debug)]
pub struct Resolved {
    pub id: RegionId,
    pub start: u32,
    pub end: u32,
    pub kind: RangeKind,
}

pub struct AddressMap {
    regions: Vec<Region>,
    /// Region indices sorted by start address.
    order: Vec<usize>,
}

impl Default for AddressMap {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressMap {
    pub fn new() -> Self {
        Self { regions: Vec::new(), order: Vec::new() }
    }

    fn insert(&mut self, start: u32, len: u32, backing: Backing) -> Result<RegionId, MapError> {
        if len == 0 {
            return Err(MapError::EmptyRegion { start });
        }
        let end = start
            .checked_add(len - 1)
            .ok_or(MapError::RegionExists { start, end: u32::MAX })?;
        for r in &self.regions {
            if start <= r.end && r.start <= end {
                return Err(MapError::RegionExists { start, end });
            }
        }
        let idx = self.regions.len();
        self.regions.push(Region { start, end, backing });
        let pos = self.order.partition_point(|&i| self.regions[i].start < start);
        self.order.insert(pos, idx);
        Ok(RegionId(idx as u32))
    }

    pub fn add_ram(&mut self, base: u32, size: u32) -> Result<RegionId, MapError> {
        self.insert(base, size, Backing::Ram(vec![0; size as usize]))
    }

    pub fn add_rom(&mut self, base: u32, bytes: Vec<u8>) -> Result<RegionId, MapError> {
        let len = bytes.len() as u32;
        self.insert(base, len, Backing::Rom(bytes))
    }

    pub fn add_mmio(
        &mut self,
        base: u32,
        size: u32,
        device: Box<dyn MmioDevice>,
    ) -> Result<RegionId, MapError> {
        self.insert(base, size, Backing::Mmio(device))
    }

    /// PCI host bridges register BAR windows through the same mechanism.
    pub fn pci_register_mmio_region(
        &mut self,
        base: u32,
        size: u32,
        device: Box<dyn MmioDevice>,
    ) -> Result<RegionId, MapError> {
        self.add_mmio(base, size, device)
    }

    /// Mirror the whole region containing `target_base` at `base`.
    pub fn add_mirror(&mut self, base: u32, target_base: u32) -> Result<RegionId, MapError> {
        let (target, len) = {
            let idx = self
                .find_index(target_base)
                .ok_or(MapError::NoSuchTarget { addr: target_base })?;
            let r = &self.regions[idx];
            if matches!(r.backing, Backing::Mmio(_)) {
                return Err(MapError::MirrorOfMmio { addr: target_base });
            }
            (self.resolve_mirror(idx).0, r.end - r.start + 1)
        };
        self.insert(base, len, Backing::Mirror { target, target_offset: 0 })
    }

    /// Map a small window at `alias_base` onto `length` bytes of the region
    /// containing `target_base`, starting `target_offset` bytes into that
    /// region. DRAM controllers use this for row/column aliasing.
    pub fn add_partial_mirror(
        &mut self,
        alias_base: u32,
        target_base: u32,
        target_offset: u32,
        length: u32,
    ) -> Result<RegionId, MapError> {
        let target = {
            let idx = self
                .find_index(target_base)
                .ok_or(MapError::NoSuchTarget { addr: target_base })?;
            if matches!(self.regions[idx].backing, Backing::Mmio(_)) {
                return Err(MapError::MirrorOfMmio { addr: target_base });
            }
            let owner = self.resolve_mirror(idx).0;
            let owner_len =
                u64::from(self.regions[owner].end) - u64::from(self.regions[owner].start) + 1;
            if u64::from(target_offset) + u64::from(length) > owner_len {
                return Err(MapError::NoSuchTarget { addr: target_base.wrapping_add(target_offset) });
            }
            owner
        };
        self.insert(alias_base, length, Backing::Mirror { target, target_offset })
    }

    fn find_index(&self, addr: u32) -> Option<usize> {
        let pos = self.order.partition_point(|&i| self.regions[i].start <= addr);
        if pos == 0 {
            return None;
        }
        let idx = self.order[pos - 1];
        let r = &self.regions[idx];
        (addr >= r.start && addr <= r.end).then_some(idx)
    }

    /// Follow mirror indirection to the storage-owning region.
    fn resolve_mirror(&self, idx: usize) -> (usize, u32) {
        match self.regions[idx].backing {
            Backing::Mirror { target, target_offset } => (target, target_offset),
            _ => (idx, 0),
        }
    }

    pub fn resolve(&self, addr: u32) -> Option<Resolved> {
        let idx = self.find_index(addr)?;
        let r = &self.regions[idx];
        let (owner, _) = self.resolve_mirror(idx);
        let kind = match self.regions[owner].backing {
            Backing::Ram(_) => RangeKind::Ram,
            Backing::Rom(_) => RangeKind::Rom,
            Backing::Mmio(_) => RangeKind::Mmio,
            Backing::Mirror { .. } => unreachable!("mirror chains are flattened at insert"),
        };
        Some(Resolved { id: RegionId(idx as u32), start: r.start, end: r.end, kind })
    }

    fn bytes(&self, idx: usize) -> Option<&[u8]> {
        match &self.regions[idx].backing {
            Backing::Ram(b) | Backing::Rom(b) => Some(b),
            _ => None,
        }
    }

    /// Read from ROM/RAM backing (`offset` relative to the region's start).
    /// Must only be called for regions whose effective kind is Rom or Ram.
    pub fn mem_read<T: MemValue>(&self, id: RegionId, offset: u32) -> T {
        let (owner, delta) = self.resolve_mirror(id.0 as usize);
        let bytes = self.bytes(owner).expect("mem_read on a non-memory region");
        T::read_be(&bytes[(delta + offset) as usize..])
    }

    /// Write through to RAM backing. Writes reaching ROM storage are dropped.
    pub fn mem_write<T: MemValue>(&mut self, id: RegionId, offset: u32, val: T) {
        let (owner, delta) = self.resolve_mirror(id.0 as usize);
        match &mut self.regions[owner].backing {
            Backing::Ram(b) => val.write_be(&mut b[(delta + offset) as usize..]),
            Backing::Rom(_) => {
                log::warn!(
                    "dropping write to ROM at region {:#010X}+{:#X}",
                    self.regions[owner].start,
                    delta + offset
                );
            }
            _ => panic!("mem_write on a non-memory region"),
        }
    }

    pub fn device_mut(&mut self, id: RegionId) -> Option<&mut dyn MmioDevice> {
        match &mut self.regions[id.0 as usize].backing {
            Backing::Mmio(dev) => Some(dev.as_mut()),
            _ => None,
        }
    }

    pub fn mmio_read(&mut self, id: RegionId, offset: u32, size: u8) -> Option<u32> {
        let start = self.regions[id.0 as usize].start;
        match &mut self.regions[id.0 as usize].backing {
            Backing::Mmio(dev) => dev.read(start, offset, size),
            _ => panic!("mmio_read on a non-MMIO region"),
        }
    }

    pub fn mmio_write(&mut self, id: RegionId, offset: u32, value: u32, size: u8) -> bool {
        let start = self.regions[id.0 as usize].start;
        match &mut self.regions[id.0 as usize].backing {
            Backing::Mmio(dev) => dev.write(start, offset, value, size),
            _ => panic!("mmio_write on a non-MMIO region"),
        }
    }

    fn open_bus<T: MemValue>(addr: u32) -> T {
        log::warn!("read from unmapped memory at {addr:#010X}");
        T::ALL_ONES
    }

    /// Typed physical read with open-bus semantics. Accesses that cross a
    /// region boundary fall back to byte-wise assembly.
    pub fn read_phys<T: MemValue>(&mut self, addr: u32) -> T {
        let Some(hit) = self.resolve(addr) else {
            return Self::open_bus::<T>(addr);
        };
        let size = T::SIZE as u32;
        if u64::from(addr) + u64::from(size) - 1 > u64::from(hit.end) {
            let mut buf = [0u8; 8];
            for (i, b) in buf[..T::SIZE].iter_mut().enumerate() {
                *b = self.read_phys::<u8>(addr.wrapping_add(i as u32));
            }
            return T::read_be(&buf);
        }
        let offset = addr - hit.start;
        match hit.kind {
            RangeKind::Ram | RangeKind::Rom => self.mem_read::<T>(hit.id, offset),
            RangeKind::Mmio => {
                if T::SIZE == 8 {
                    let hi = self.read_phys::<u32>(addr) as u64;
                    let lo = self.read_phys::<u32>(addr + 4) as u64;
                    return T::from_u64((hi << 32) | lo);
                }
                match self.mmio_read(hit.id, offset, T::SIZE as u8) {
                    Some(v) => T::from_u64(v as u64),
                    None => Self::open_bus::<T>(addr),
                }
            }
        }
    }

    /// Typed physical write; unmapped and unclaimed writes are dropped.
    pub fn write_phys<T: MemValue>(&mut self, addr: u32, val: T) {
        let Some(hit) = self.resolve(addr) else {
            log::warn!("dropping write to unmapped memory at {addr:#010X}");
            return;
        };
        let size = T::SIZE as u32;
        if u64::from(addr) + u64::from(size) - 1 > u64::from(hit.end) {
            let mut buf = [0u8; 8];
            val.write_be(&mut buf);
            for (i, b) in buf[..T::SIZE].iter().enumerate() {
                self.write_phys::<u8>(addr.wrapping_add(i as u32), *b);
            }
            return;
        }
        let offset = addr - hit.start;
        match hit.kind {
            RangeKind::Ram | RangeKind::Rom => self.mem_write::<T>(hit.id, offset, val),
            RangeKind::Mmio => {
                if T::SIZE == 8 {
                    let v = val.to_u64();
                    self.write_phys::<u32>(addr, (v >> 32) as u32);
                    self.write_phys::<u32>(addr + 4, v as u32);
                    return;
                }
                if !self.mmio_write(hit.id, offset, val.to_u64() as u32, T::SIZE as u8) {
                    log::warn!("MMIO device dropped write at {addr:#010X}");
                }
            }
        }
    }

    /// Copy bytes straight into ROM/RAM backing (ROM image loading, tests).
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let hit = self.resolve(addr).expect("load outside any region");
        let (owner, delta) = self.resolve_mirror(hit.id.0 as usize);
        let offset = (delta + (addr - hit.start)) as usize;
        match &mut self.regions[owner].backing {
            Backing::Ram(b) | Backing::Rom(b) => {
                b[offset..offset + data.len()].copy_from_slice(data);
            }
            _ => panic!("load into a non-memory region"),
        }
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
