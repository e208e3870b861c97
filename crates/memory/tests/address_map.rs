use memory::{AddressMap, MapError, MmioDevice, RangeKind};

struct ScratchReg {
    reg: u32,
    decline_all: bool,
}

impl ScratchReg {
    fn new() -> Self {
        Self { reg: 0, decline_all: false }
    }
}

impl MmioDevice for ScratchReg {
    fn read(&mut self, _rgn_start: u32, offset: u32, _size: u8) -> Option<u32> {
        if self.decline_all {
            return None;
        }
        (offset == 0).then_some(self.reg)
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, _size: u8) -> bool {
        if self.decline_all || offset != 0 {
            return false;
        }
        self.reg = value;
        true
    }
}

#[test]
fn overlapping_regions_are_rejected() {
    let mut map = AddressMap::new();
    map.add_ram(0x0000_0000, 0x10000).unwrap();
    assert_eq!(
        map.add_ram(0x0000_8000, 0x10000),
        Err(MapError::RegionExists { start: 0x8000, end: 0x17FFF })
    );
    // Touching but not overlapping is fine.
    map.add_ram(0x0001_0000, 0x1000).unwrap();
}

#[test]
fn ram_is_big_endian() {
    let mut map = AddressMap::new();
    map.add_ram(0x1000, 0x1000).unwrap();
    map.write_phys::<u32>(0x1000, 0xDEADBEEF);
    assert_eq!(map.read_phys::<u8>(0x1000), 0xDE);
    assert_eq!(map.read_phys::<u8>(0x1003), 0xEF);
    assert_eq!(map.read_phys::<u16>(0x1002), 0xBEEF);
    assert_eq!(map.read_phys::<u32>(0x1000), 0xDEADBEEF);

    map.write_phys::<u64>(0x1010, 0x0102030405060708);
    assert_eq!(map.read_phys::<u32>(0x1014), 0x05060708);
}

#[test]
fn unaligned_access_works() {
    let mut map = AddressMap::new();
    map.add_ram(0, 0x100).unwrap();
    map.write_phys::<u32>(1, 0xCAFEBABE);
    assert_eq!(map.read_phys::<u32>(1), 0xCAFEBABE);
    assert_eq!(map.read_phys::<u8>(1), 0xCA);
}

#[test]
fn rom_reads_back_and_drops_writes() {
    let mut map = AddressMap::new();
    map.add_rom(0xFFF0_0000, vec![0x12, 0x34, 0x56, 0x78]).unwrap();
    assert_eq!(map.read_phys::<u32>(0xFFF0_0000), 0x12345678);
    map.write_phys::<u32>(0xFFF0_0000, 0);
    assert_eq!(map.read_phys::<u32>(0xFFF0_0000), 0x12345678);
}

#[test]
fn unmapped_reads_are_all_ones_and_writes_dropped() {
    let mut map = AddressMap::new();
    assert_eq!(map.read_phys::<u8>(0x4000_0000), 0xFF);
    assert_eq!(map.read_phys::<u16>(0x4000_0000), 0xFFFF);
    assert_eq!(map.read_phys::<u32>(0x4000_0000), 0xFFFF_FFFF);
    map.write_phys::<u32>(0x4000_0000, 0x1234_5678); // must not panic
}

#[test]
fn full_mirror_aliases_the_target_storage() {
    let mut map = AddressMap::new();
    map.add_ram(0x0000_0000, 0x1000).unwrap();
    map.add_mirror(0x8000_0000, 0x0000_0000).unwrap();

    map.write_phys::<u32>(0x8000_0010, 0xA5A5_0001);
    assert_eq!(map.read_phys::<u32>(0x0000_0010), 0xA5A5_0001);

    map.write_phys::<u32>(0x0000_0020, 0x5A5A_0002);
    assert_eq!(map.read_phys::<u32>(0x8000_0020), 0x5A5A_0002);
}

#[test]
fn partial_mirror_window_lands_at_target_offset() {
    // DRAM alias: a 0x1000-byte window at 0xC01000 maps 0x2000 bytes into
    // the bank.
    let mut map = AddressMap::new();
    map.add_ram(0x0000_0000, 0x0100_0000).unwrap();
    map.add_partial_mirror(0x00C0_1000, 0x0000_0000, 0x2000, 0x1000).unwrap();

    map.write_phys::<u32>(0x00C0_1004, 0xFEED_FACE);
    assert_eq!(map.read_phys::<u32>(0x2004), 0xFEED_FACE);

    let hit = map.resolve(0x00C0_1FFF).unwrap();
    assert_eq!(hit.kind, RangeKind::Ram);
    assert_eq!(hit.start, 0x00C0_1000);
    assert_eq!(hit.end, 0x00C0_1FFF);
}

#[test]
fn mirror_of_mmio_is_refused() {
    let mut map = AddressMap::new();
    map.add_mmio(0xF800_0000, 0x800, Box::new(ScratchReg::new())).unwrap();
    assert_eq!(
        map.add_mirror(0x1000_0000, 0xF800_0000),
        Err(MapError::MirrorOfMmio { addr: 0xF800_0000 })
    );
}

#[test]
fn mmio_round_trip_and_open_bus_on_decline() {
    let mut map = AddressMap::new();
    let id = map.add_mmio(0xF800_0000, 0x100, Box::new(ScratchReg::new())).unwrap();

    map.write_phys::<u32>(0xF800_0000, 0x0000_BEEF);
    assert_eq!(map.read_phys::<u32>(0xF800_0000), 0x0000_BEEF);

    // Offset 4 is unclaimed by the device: open bus.
    assert_eq!(map.read_phys::<u32>(0xF800_0004), 0xFFFF_FFFF);
    map.write_phys::<u32>(0xF800_0004, 1); // dropped with a warning

    assert!(map.device_mut(id).is_some());
}

#[test]
fn cross_region_access_splits_into_bytes() {
    let mut map = AddressMap::new();
    map.add_ram(0x0000, 0x1000).unwrap();
    map.add_ram(0x1000, 0x1000).unwrap();
    map.write_phys::<u32>(0x0FFE, 0x00C0_FFEE);
    assert_eq!(map.read_phys::<u16>(0x0FFE), 0x00C0);
    assert_eq!(map.read_phys::<u16>(0x1000), 0xFFEE);
    assert_eq!(map.read_phys::<u32>(0x0FFE), 0x00C0_FFEE);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn byte_roundtrip(addr in 0u32..0x1000, val: u8) {
            let mut map = AddressMap::new();
            map.add_ram(0, 0x1000).unwrap();
            map.write_phys::<u8>(addr, val);
            prop_assert_eq!(map.read_phys::<u8>(addr), val);
        }

        #[test]
        fn u32_roundtrip_any_alignment(addr in 0u32..0x0FFC, val: u32) {
            let mut map = AddressMap::new();
            map.add_ram(0, 0x1000).unwrap();
            map.write_phys::<u32>(addr, val);
            prop_assert_eq!(map.read_phys::<u32>(addr), val);
        }

        #[test]
        fn resolve_agrees_with_range_bounds(addr: u32) {
            let mut map = AddressMap::new();
            map.add_ram(0x2000, 0x2000).unwrap();
            map.add_rom(0x8000, vec![0; 0x100]).unwrap();
            match map.resolve(addr) {
                Some(hit) => prop_assert!(addr >= hit.start && addr <= hit.end),
                None => prop_assert!(
                    !(0x2000..0x4000).contains(&addr) && !(0x8000..0x8100).contains(&addr)
                ),
            }
        }
    }
}
