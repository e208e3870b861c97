use gossamer_mmu::{make_pte, pteg_addr, translate_page, PageTableMem, WalkError};

/// Flat RAM page-table backing.
struct FlatMem {
    bytes: Vec<u8>,
}

impl FlatMem {
    fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    fn install_pte(&mut self, sdr1: u32, sr_val: u32, ea: u32, pa: u32, pp: u8) {
        let page_index = (ea >> 12) & 0xFFFF;
        let hash1 = (sr_val & 0x7FFFF) ^ page_index;
        let pteg = pteg_addr(sdr1, hash1);
        let (w0, w1) = make_pte(sr_val & 0x00FF_FFFF, ea, pa, pp, false);
        self.write_u32(pteg, w0);
        self.write_u32(pteg + 4, w1);
    }
}

impl PageTableMem for FlatMem {
    fn read_u32(&mut self, pa: u32) -> Option<u32> {
        let i = pa as usize;
        if i + 4 > self.bytes.len() {
            return None;
        }
        Some(u32::from_be_bytes(self.bytes[i..i + 4].try_into().unwrap()))
    }

    fn write_u32(&mut self, pa: u32, val: u32) {
        let i = pa as usize;
        self.bytes[i..i + 4].copy_from_slice(&val.to_be_bytes());
    }
}

const SDR1: u32 = 0; // 64 KB hash table at physical 0
const SR: u32 = 0x0000_0123; // VSID 0x123, no Ks/Kp, executable

#[test]
fn primary_hash_hit_translates_and_sets_r() {
    let mut mem = FlatMem::new(0x100000);
    mem.install_pte(SDR1, SR, 0x0004_7000, 0x0009_1000, 0b10);

    let walk = translate_page(&mut mem, SDR1, SR, 0x0004_7A5C, false, false, false).unwrap();
    assert_eq!(walk.pa, 0x0009_1A5C);
    assert_eq!(walk.pp, 0b10);

    // R set, C clear after a read.
    let pte1 = mem.read_u32(walk.pte_pa + 4).unwrap();
    assert_eq!(pte1 & 0x100, 0x100);
    assert_eq!(pte1 & 0x80, 0);
}

#[test]
fn write_access_sets_changed_bit() {
    let mut mem = FlatMem::new(0x100000);
    mem.install_pte(SDR1, SR, 0x0004_7000, 0x0009_1000, 0b10);

    let walk = translate_page(&mut mem, SDR1, SR, 0x0004_7000, false, false, true).unwrap();
    let pte1 = mem.read_u32(walk.pte_pa + 4).unwrap();
    assert_eq!(pte1 & 0x180, 0x180);
}

#[test]
fn secondary_hash_is_searched_on_primary_miss() {
    let mut mem = FlatMem::new(0x100000);
    let ea = 0x0001_2000u32;
    let page_index = (ea >> 12) & 0xFFFF;
    let hash2 = !((SR & 0x7FFFF) ^ page_index);
    let pteg = pteg_addr(SDR1, hash2);
    let (w0, w1) = make_pte(SR & 0x00FF_FFFF, ea, 0x0005_0000, 0b10, true);
    mem.write_u32(pteg, w0);
    mem.write_u32(pteg + 4, w1);

    let walk = translate_page(&mut mem, SDR1, SR, ea | 0x10, false, false, false).unwrap();
    assert_eq!(walk.pa, 0x0005_0010);
}

#[test]
fn missing_pte_is_a_page_fault() {
    let mut mem = FlatMem::new(0x100000);
    assert_eq!(
        translate_page(&mut mem, SDR1, SR, 0x0666_0000, false, false, false),
        Err(WalkError::PageFault)
    );
}

#[test]
fn pp_and_key_govern_access() {
    let mut mem = FlatMem::new(0x100000);
    // PP=01: user key faults writes.
    mem.install_pte(SDR1, SR, 0x0000_3000, 0x0000_8000, 0b01);
    let sr_kp = SR | 0x2000_0000; // Kp set

    assert!(translate_page(&mut mem, SDR1, sr_kp, 0x3000, false, true, false).is_ok());
    assert_eq!(
        translate_page(&mut mem, SDR1, sr_kp, 0x3000, false, true, true),
        Err(WalkError::Protection)
    );
    // Supervisor (Ks clear): key 0, write allowed.
    assert!(translate_page(&mut mem, SDR1, sr_kp, 0x3000, false, false, true).is_ok());

    // PP=11 is read-only for everyone.
    mem.install_pte(SDR1, SR, 0x0000_5000, 0x0000_9000, 0b11);
    assert_eq!(
        translate_page(&mut mem, SDR1, SR, 0x5000, false, false, true),
        Err(WalkError::Protection)
    );
}

#[test]
fn no_execute_segment_blocks_fetches_only() {
    let mut mem = FlatMem::new(0x100000);
    let sr_nx = SR | 0x1000_0000;
    mem.install_pte(SDR1, sr_nx, 0x0000_3000, 0x0000_8000, 0b10);

    assert_eq!(
        translate_page(&mut mem, SDR1, sr_nx, 0x3000, true, false, false),
        Err(WalkError::NoExecute)
    );
    assert!(translate_page(&mut mem, SDR1, sr_nx, 0x3000, false, false, false).is_ok());
}

#[test]
fn direct_store_segment_is_rejected() {
    let mut mem = FlatMem::new(0x100000);
    assert_eq!(
        translate_page(&mut mem, SDR1, 0x8000_0000, 0x3000, false, false, false),
        Err(WalkError::DirectStore)
    );
}

#[test]
fn unbacked_page_table_reports_no_page_table() {
    let mut mem = FlatMem::new(0x40); // far too small to hold the PTEG
    assert_eq!(
        translate_page(&mut mem, 0x00FF_0000, SR, 0x3000, false, false, false),
        Err(WalkError::NoPageTable)
    );
}
