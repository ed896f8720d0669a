//! Memory-mapped hardware.
//!
//! Devices expose a small window of word registers and may raise CPU
//! interrupts when ticked. The [`DeviceBus`] owns them, keyed by their
//! 32-bit hardware id, and routes memory traffic to them through observers
//! installed on [`Memory`](crate::cpu::Memory).

pub mod bus;
pub mod clock;
pub mod keyboard;
pub mod display;

use crate::cpu::{Cpu, CpuError, Word};
use std::cell::RefCell;
use std::rc::Rc;

pub use bus::{BusError, DeviceBus, Mapping, MmioPort};
pub use clock::{Clock, CLOCK_ID};
pub use keyboard::{Keyboard, KEYBOARD_ID};
pub use display::{Display, VramWatch, DISPLAY_ID, VRAM_WORDS};

/// The receiving end of a device interrupt.
pub trait InterruptLine {
    /// Raise an interrupt carrying `message`. Returns whether it was taken
    /// (it is dropped while interrupts are masked).
    fn interrupt(&mut self, message: Word) -> Result<bool, CpuError>;
}

impl InterruptLine for Cpu {
    fn interrupt(&mut self, message: Word) -> Result<bool, CpuError> {
        Cpu::interrupt(self, message)
    }
}

/// A peripheral attached to the bus.
///
/// Register numbers are device-relative (0, 1, 2, ...); translating an
/// absolute address to a register is the bus's job.
pub trait Device {
    /// Fixed identifier of the device type.
    fn hardware_id(&self) -> u32;

    /// Human readable name.
    fn name(&self) -> &'static str;

    /// Size of the register window in words.
    fn register_count(&self) -> Word;

    /// Value the CPU sees when reading `register`.
    fn on_memory_read(&mut self, register: Word) -> Word;

    /// React to the CPU storing `value` into `register`.
    fn on_memory_write(&mut self, register: Word, value: Word);

    /// Periodic tick. May raise interrupts.
    fn update(&mut self, cpu: &mut dyn InterruptLine) -> Result<(), CpuError> {
        let _ = cpu;
        Ok(())
    }
}

/// Shared handle under which devices live on the bus.
pub type DeviceHandle = Rc<RefCell<dyn Device>>;
