use gossamer_cpu::state::{msr, pvr, spr};
use gossamer_machine::Machine;
use gossamer_time::InterruptSink;
use memory::MmioDevice;
use pretty_assertions::assert_eq;

const NOP: u32 = 0x6000_0000;

fn load_code(mach: &mut Machine, addr: u32, code: &[u32]) {
    let bytes: Vec<u8> = code.iter().flat_map(|w| w.to_be_bytes()).collect();
    mach.bus.load(addr, &bytes);
}

/// A DMA-ish device: one status register, raises line 3 when its timer
/// cookie arrives.
struct DmaEngine {
    status: u32,
    line: u32,
}

impl MmioDevice for DmaEngine {
    fn read(&mut self, _rgn_start: u32, offset: u32, _size: u8) -> Option<u32> {
        (offset == 0).then_some(self.status)
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, _size: u8) -> bool {
        if offset != 0 {
            return false;
        }
        self.status = value;
        true
    }

    fn on_timer(&mut self, cookie: u32, irq: &mut dyn InterruptSink) {
        self.status = cookie;
        irq.assert_line(self.line);
    }

    fn name(&self) -> &str {
        "dma-engine"
    }
}

fn test_machine() -> Machine {
    let mut mach = Machine::new(pvr::MPC750, false, 16_705_000).unwrap();
    mach.add_ram(0, 0x10000).unwrap();
    mach.add_rom(0xFFF0_0000, vec![0; 0x10000]).unwrap();
    mach
}

#[test]
fn guest_store_reaches_the_device_before_the_next_fetch() {
    let mut mach = test_machine();
    let dev = mach
        .add_mmio_device(0x8000_0000, 0x100, Box::new(DmaEngine { status: 0, line: 3 }))
        .unwrap();

    // lis r3, 0x8000 ; li r4, 0x2A ; stw r4, 0(r3)
    load_code(
        &mut mach,
        0xFFF0_0100,
        &[0x3C60_8000, 0x3880_002A, 0x9083_0000, NOP],
    );
    mach.run_until(0xFFF0_010C);

    assert_eq!(mach.bus.mmio_read(dev, 0, 4), Some(0x2A));
}

#[test]
fn device_timer_fires_between_instructions_and_raises_its_line() {
    let mut mach = test_machine();
    let dev = mach
        .add_mmio_device(0x8000_0000, 0x100, Box::new(DmaEngine { status: 0, line: 5 }))
        .unwrap();
    mach.add_device_timer(1_000, dev, 0xD00D);

    load_code(&mut mach, 0xFFF0_0100, &[NOP; 128]);
    // 1 µs of deterministic time is about 63 instructions.
    mach.run_until(0xFFF0_0100 + 128 * 4);

    assert_eq!(mach.bus.mmio_read(dev, 0, 4), Some(0xD00D));
    assert!(mach.cpu.ext_int_asserted(), "line wired to the external pin");
}

#[test]
fn pending_line_vectors_once_ee_is_enabled() {
    let mut mach = test_machine();
    let dev = mach
        .add_mmio_device(0x8000_0000, 0x100, Box::new(DmaEngine { status: 0, line: 1 }))
        .unwrap();
    mach.add_device_timer(100, dev, 1);

    // Spin with EE off, then enable EE through mtmsr.
    let mtmsr_r6 = 0x7C00_0000 | (6 << 21) | (146 << 1);
    let mut code = vec![NOP; 32];
    code.push(mtmsr_r6);
    code.push(NOP);
    load_code(&mut mach, 0xFFF0_0100, &code);
    mach.cpu.state.gpr[6] = mach.cpu.state.msr | msr::EE;

    mach.run_until(0xFFF0_0500);
    assert_eq!(mach.cpu.state.pc, 0xFFF0_0500);
    assert_eq!(mach.cpu.state.spr[spr::SRR0], 0xFFF0_0100 + 33 * 4);
}

#[test]
fn interrupt_controller_aggregates_lines() {
    let mut mach = test_machine();

    let cpu = &mut mach.cpu;
    mach.irqs.assert(2, cpu);
    mach.irqs.assert(7, cpu);
    assert!(cpu.ext_int_asserted());

    mach.irqs.release(2, cpu);
    assert!(cpu.ext_int_asserted(), "line 7 still up");
    mach.irqs.release(7, cpu);
    assert!(!cpu.ext_int_asserted());
}

#[test]
fn cancelled_device_timer_never_fires() {
    let mut mach = test_machine();
    let dev = mach
        .add_mmio_device(0x8000_0000, 0x100, Box::new(DmaEngine { status: 0, line: 0 }))
        .unwrap();
    let id = mach.add_device_timer(100, dev, 0xBAD);
    mach.cancel_timer(id);

    load_code(&mut mach, 0xFFF0_0100, &[NOP; 64]);
    mach.run_until(0xFFF0_0100 + 64 * 4);
    assert_eq!(mach.bus.mmio_read(dev, 0, 4), Some(0));
}
