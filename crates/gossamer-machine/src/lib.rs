//! Machine context: the CPU core, the guest address map and the interrupt
//! controller wired together.
//!
//! Devices are owned by the address map and addressed by stable
//! [`DeviceId`]s; nothing in the machine holds references across
//! components, so device callbacks can borrow the map mutably while the
//! core is suspended between instructions.

use gossamer_cpu::{Cpu, CpuEvent, InitError, PowerOff};
use gossamer_time::TimerId;
use memory::{AddressMap, MapError, MmioDevice, RegionId};
use thiserror::Error;

/// Stable device handle: the MMIO region the device was registered with.
pub type DeviceId = RegionId;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Cpu(#[from] InitError),
}

/// Interrupt controller surface: devices assert and release numbered
/// lines; the wire to the core is the single external-interrupt pin.
#[derive(Default)]
pub struct InterruptController {
    active: u64,
}

impl InterruptController {
    pub fn assert(&mut self, line: u32, cpu: &mut Cpu) {
        log::trace!("interrupt line {line} asserted");
        self.active |= 1u64 << (line & 63);
        cpu.assert_ext_int();
    }

    pub fn release(&mut self, line: u32, cpu: &mut Cpu) {
        log::trace!("interrupt line {line} released");
        self.active &= !(1u64 << (line & 63));
        if self.active == 0 {
            cpu.release_ext_int();
        }
    }

    pub fn line_active(&self, line: u32) -> bool {
        self.active & (1u64 << (line & 63)) != 0
    }
}

pub struct Machine {
    pub cpu: Cpu,
    pub bus: AddressMap,
    pub irqs: InterruptController,
}

impl Machine {
    pub fn new(pvr: u32, include_601_ops: bool, tb_freq_hz: u64) -> Result<Self, MachineError> {
        Ok(Self {
            cpu: Cpu::new(pvr, include_601_ops, tb_freq_hz)?,
            bus: AddressMap::new(),
            irqs: InterruptController::default(),
        })
    }

    // ------------------------------------------------------ construction

    pub fn add_ram(&mut self, base: u32, size: u32) -> Result<(), MachineError> {
        self.bus.add_ram(base, size)?;
        Ok(())
    }

    pub fn add_rom(&mut self, base: u32, image: Vec<u8>) -> Result<(), MachineError> {
        self.bus.add_rom(base, image)?;
        Ok(())
    }

    pub fn add_mmio_device(
        &mut self,
        base: u32,
        size: u32,
        device: Box<dyn MmioDevice>,
    ) -> Result<DeviceId, MachineError> {
        Ok(self.bus.add_mmio(base, size, device)?)
    }

    /// One-shot timer delivered to `device.on_timer(cookie, …)` at an
    /// instruction boundary.
    pub fn add_device_timer(&mut self, delta_ns: u64, device: DeviceId, cookie: u32) -> TimerId {
        log::debug!("one-shot timer for device {device:?} in {delta_ns} ns (cookie {cookie:#X})");
        self.cpu.add_oneshot(delta_ns, CpuEvent::Device { region: device, cookie })
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.cpu.cancel_oneshot(id);
    }

    // --------------------------------------------------------- execution

    pub fn run(&mut self) -> PowerOff {
        self.cpu.run(&mut self.bus)
    }

    pub fn run_until(&mut self, goal_addr: u32) -> PowerOff {
        self.cpu.run_until(&mut self.bus, goal_addr)
    }

    pub fn step(&mut self) {
        self.cpu.step(&mut self.bus);
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
    }
}
