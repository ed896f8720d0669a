//! Device registry and memory-mapped I/O routing.

use crate::cpu::{CpuError, Memory, MemoryError, Observer, Word};
use crate::hw::{DeviceHandle, InterruptLine};
use indexmap::IndexMap;
use std::rc::Rc;
use thiserror::Error;

/// A device's register window in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub hardware_id: u32,
    pub base: Word,
    pub len: Word,
}

impl Mapping {
    /// Whether `addr` falls inside the window.
    pub fn contains(&self, addr: Word) -> bool {
        addr >= self.base && u32::from(addr) < self.end()
    }

    /// One past the last address (may be 0x10000).
    pub fn end(&self) -> u32 {
        u32::from(self.base) + u32::from(self.len)
    }

    fn overlaps(&self, other: &Mapping) -> bool {
        u32::from(self.base) < other.end() && u32::from(other.base) < self.end()
    }
}

/// Registry of devices keyed by hardware id, in registration order.
#[derive(Default)]
pub struct DeviceBus {
    devices: IndexMap<u32, DeviceHandle>,
    mappings: Vec<Mapping>,
}

impl DeviceBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing (and returning) any device with the same id.
    pub fn register_device(&mut self, device: DeviceHandle) -> Option<DeviceHandle> {
        let (id, name) = {
            let d = device.borrow();
            (d.hardware_id(), d.name())
        };
        tracing::debug!(id = format_args!("{id:#010x}"), name, "device registered");
        self.devices.insert(id, device)
    }

    /// Look up a device by hardware id.
    pub fn get_device(&self, hardware_id: u32) -> Option<DeviceHandle> {
        self.devices.get(&hardware_id).map(Rc::clone)
    }

    /// Hardware ids in registration order.
    pub fn hardware_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.devices.keys().copied()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Place a registered device's register window at `base`.
    ///
    /// A device has at most one window; mapping it again moves it.
    pub fn map(&mut self, hardware_id: u32, base: Word) -> Result<Mapping, BusError> {
        let device = self
            .devices
            .get(&hardware_id)
            .ok_or(BusError::UnknownDevice(hardware_id))?;
        let len = device.borrow().register_count();

        let mapping = Mapping { hardware_id, base, len };
        if mapping.end() > 0x1_0000 {
            return Err(BusError::OutOfSpace { base, len });
        }
        if let Some(other) = self
            .mappings
            .iter()
            .find(|m| m.hardware_id != hardware_id && m.overlaps(&mapping))
        {
            return Err(BusError::Overlap {
                base,
                len,
                other: other.hardware_id,
            });
        }

        self.mappings.retain(|m| m.hardware_id != hardware_id);
        self.mappings.push(mapping);
        tracing::debug!(
            id = format_args!("{hardware_id:#010x}"),
            base = format_args!("{base:#06x}"),
            len,
            "device mapped"
        );
        Ok(mapping)
    }

    /// All register windows.
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Translate an absolute address to `(device, register)`.
    pub fn route(&self, addr: Word) -> Option<(DeviceHandle, Word)> {
        let mapping = self.mappings.iter().find(|m| m.contains(addr))?;
        let device = self.get_device(mapping.hardware_id)?;
        Some((device, addr - mapping.base))
    }

    /// Install an [`MmioPort`] observer on every mapped address.
    pub fn attach(&self, mem: &mut Memory) -> Result<(), BusError> {
        for mapping in &self.mappings {
            let Some(device) = self.get_device(mapping.hardware_id) else {
                continue;
            };
            for register in 0..mapping.len {
                let addr = usize::from(mapping.base) + usize::from(register);
                mem.watch(addr, MmioPort::new(Rc::clone(&device), register))?;
            }
        }
        Ok(())
    }

    /// Tick every device once, in registration order.
    pub fn update(&self, cpu: &mut dyn InterruptLine) -> Result<(), CpuError> {
        for (id, device) in &self.devices {
            match device.try_borrow_mut() {
                Ok(mut d) => d.update(cpu)?,
                Err(_) => tracing::warn!(id = format_args!("{id:#010x}"), "device busy, tick skipped"),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeviceBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBus")
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .field("mappings", &self.mappings)
            .finish()
    }
}

/// Memory observer forwarding one address to one device register.
///
/// If the device is already borrowed (it is the one currently running, e.g.
/// an interrupt push landed in its own window) the word is stored in plain
/// memory and the device is not told.
pub struct MmioPort {
    device: DeviceHandle,
    register: Word,
}

impl MmioPort {
    pub fn new(device: DeviceHandle, register: Word) -> Self {
        Self { device, register }
    }
}

impl Observer for MmioPort {
    fn on_write(&mut self, value: Word) {
        match self.device.try_borrow_mut() {
            Ok(mut device) => device.on_memory_write(self.register, value),
            Err(_) => tracing::warn!(register = self.register, value, "re-entrant device write ignored"),
        }
    }

    fn on_read(&mut self) -> Option<Word> {
        match self.device.try_borrow_mut() {
            Ok(mut device) => Some(device.on_memory_read(self.register)),
            Err(_) => {
                tracing::warn!(register = self.register, "re-entrant device read served from memory");
                None
            }
        }
    }
}

/// Errors raised while wiring devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no device with hardware id {0:#010x}")]
    UnknownDevice(u32),

    #[error("window {base:#06x}+{len} overlaps device {other:#010x}")]
    Overlap { base: Word, len: Word, other: u32 },

    #[error("window {base:#06x}+{len} runs past the end of memory")]
    OutOfSpace { base: Word, len: Word },

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::hw::Device;
    use std::cell::RefCell;
    use tracing_test::traced_test;

    /// Scratch device: four plain registers, counts ticks, interrupts on
    /// every tick with message 7.
    #[derive(Default)]
    struct Scratch {
        id: u32,
        regs: [Word; 4],
        ticks: u32,
    }

    impl Device for Scratch {
        fn hardware_id(&self) -> u32 {
            self.id
        }

        fn name(&self) -> &'static str {
            "scratch"
        }

        fn register_count(&self) -> Word {
            4
        }

        fn on_memory_read(&mut self, register: Word) -> Word {
            self.regs[usize::from(register)] + 1
        }

        fn on_memory_write(&mut self, register: Word, value: Word) {
            self.regs[usize::from(register)] = value;
        }

        fn update(&mut self, cpu: &mut dyn InterruptLine) -> Result<(), CpuError> {
            self.ticks += 1;
            cpu.interrupt(7)?;
            Ok(())
        }
    }

    fn scratch(id: u32) -> Rc<RefCell<Scratch>> {
        Rc::new(RefCell::new(Scratch { id, ..Default::default() }))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut bus = DeviceBus::new();
        assert!(bus.register_device(scratch(1)).is_none());
        assert!(bus.register_device(scratch(2)).is_none());

        assert!(bus.get_device(1).is_some());
        assert!(bus.get_device(3).is_none());
        assert_eq!(bus.hardware_ids().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut bus = DeviceBus::new();
        let first = scratch(1);
        bus.register_device(first.clone());
        let replaced = bus.register_device(scratch(1));

        assert!(replaced.is_some());
        assert_eq!(bus.len(), 1);
        bus.update(&mut Cpu::new()).unwrap();
        assert_eq!(first.borrow().ticks, 0);
    }

    #[test]
    fn test_map_rejects_bad_windows() {
        let mut bus = DeviceBus::new();
        bus.register_device(scratch(1));
        bus.register_device(scratch(2));

        assert_eq!(bus.map(9, 0), Err(BusError::UnknownDevice(9)));
        bus.map(1, 0x100).unwrap();
        assert_eq!(
            bus.map(2, 0x102),
            Err(BusError::Overlap { base: 0x102, len: 4, other: 1 })
        );
        assert_eq!(
            bus.map(2, 0xFFFE),
            Err(BusError::OutOfSpace { base: 0xFFFE, len: 4 })
        );
        bus.map(2, 0xFFFC).unwrap();

        // Re-mapping moves the window.
        bus.map(1, 0x200).unwrap();
        assert_eq!(bus.mappings().len(), 2);
        assert!(bus.route(0x100).is_none());
        assert_eq!(bus.route(0x203).map(|(_, r)| r), Some(3));
    }

    #[test]
    fn test_mmio_routes_reads_and_writes() {
        let mut bus = DeviceBus::new();
        let dev = scratch(1);
        bus.register_device(dev.clone());
        bus.map(1, 0xF000).unwrap();

        let mut mem = Memory::new();
        bus.attach(&mut mem).unwrap();

        mem.write(0xF002, 41).unwrap();
        assert_eq!(dev.borrow().regs[2], 41);
        assert_eq!(mem.read(0xF002).unwrap(), 42);
        // Outside the window nothing is routed.
        mem.write(0xF004, 5).unwrap();
        assert_eq!(mem.read(0xF004).unwrap(), 5);
    }

    #[test]
    fn test_update_ticks_every_device() {
        let mut bus = DeviceBus::new();
        let a = scratch(1);
        let b = scratch(2);
        bus.register_device(a.clone());
        bus.register_device(b.clone());

        let mut cpu = Cpu::new();
        bus.update(&mut cpu).unwrap();

        assert_eq!(a.borrow().ticks, 1);
        assert_eq!(b.borrow().ticks, 1);
    }

    #[test]
    fn test_two_interrupts_in_one_pass() {
        let mut bus = DeviceBus::new();
        bus.register_device(scratch(1));
        bus.register_device(scratch(2));

        let mut cpu = Cpu::new();
        cpu.regs.ia = 0x300;
        cpu.regs.pc = 0x10;
        bus.update(&mut cpu).unwrap();

        // Both interrupts pushed; the second saw the first's PC and A.
        assert_eq!(cpu.regs.pc, 0x300);
        assert_eq!(cpu.regs.sp, 0xFFFB);
        assert_eq!(cpu.mem.peek(0xFFFC).unwrap(), 0x300);
        assert_eq!(cpu.mem.peek(0xFFFB).unwrap(), 7);
    }

    #[traced_test]
    #[test]
    fn test_reentrant_port_write_is_skipped() {
        let mut bus = DeviceBus::new();
        let dev = scratch(1);
        bus.register_device(dev.clone());
        // Window right under the reset stack pointer.
        bus.map(1, 0xFFFB).unwrap();

        let mut cpu = Cpu::new();
        bus.attach(&mut cpu.mem).unwrap();
        cpu.regs.ia = 0x300;
        cpu.regs.pc = 0x1234;

        bus.update(&mut cpu).unwrap();

        // The pushes were stored but the busy device was not notified.
        assert_eq!(cpu.mem.peek(0xFFFE).unwrap(), 0x1234);
        assert_eq!(dev.borrow().regs, [0; 4]);
        assert!(logs_contain("re-entrant device write ignored"));
    }
}
