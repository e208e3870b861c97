//! Shared fixture: a G3 core over 64 KB of RAM at 0 and 64 KB of ROM-class
//! storage at the reset vector.
#![allow(dead_code)]

use gossamer_cpu::state::pvr;
use gossamer_cpu::Cpu;
use memory::AddressMap;

pub const TB_FREQ_HZ: u64 = 16_705_000;

pub fn test_cpu() -> (Cpu, AddressMap) {
    let cpu = Cpu::new(pvr::MPC750, false, TB_FREQ_HZ).unwrap();
    let mut bus = AddressMap::new();
    bus.add_ram(0, 0x10000).unwrap();
    bus.add_rom(0xFFF0_0000, vec![0; 0x10000]).unwrap();
    (cpu, bus)
}

pub fn test_cpu_601() -> (Cpu, AddressMap) {
    let cpu = Cpu::new(pvr::MPC601, false, TB_FREQ_HZ).unwrap();
    let mut bus = AddressMap::new();
    bus.add_ram(0, 0x10000).unwrap();
    bus.add_rom(0xFFF0_0000, vec![0; 0x10000]).unwrap();
    (cpu, bus)
}

/// Write instruction words into memory starting at `addr`.
pub fn load_code(bus: &mut AddressMap, addr: u32, code: &[u32]) {
    let bytes: Vec<u8> = code.iter().flat_map(|w| w.to_be_bytes()).collect();
    bus.load(addr, &bytes);
}
