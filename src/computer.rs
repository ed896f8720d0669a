//! The assembled machine: CPU, memory and devices wired together.

use crate::asm::{assemble, AssemblerError, ImageError};
use crate::config::{ConfigError, MachineConfig};
use crate::cpu::{Cpu, CpuError, Instruction, Memory, MemoryError, Registers, Word};
use crate::hw::{BusError, Clock, DeviceBus, Display, Keyboard, VramWatch, CLOCK_ID, DISPLAY_ID, KEYBOARD_ID};
use std::cell::{Ref, RefCell};
use std::ops::Range;
use std::rc::Rc;
use thiserror::Error;

/// A complete virtual computer.
#[derive(Debug)]
pub struct Computer {
    pub cpu: Cpu,
    pub bus: DeviceBus,
    config: MachineConfig,
    clock: Rc<RefCell<Clock>>,
    keyboard: Rc<RefCell<Keyboard>>,
    display: Rc<RefCell<Display>>,
    /// Addresses currently carrying a [`VramWatch`].
    vram_window: Option<Range<usize>>,
}

impl Computer {
    /// Build a computer with the default configuration.
    pub fn new() -> Result<Self, ComputerError> {
        Self::with_config(MachineConfig::default())
    }

    /// Build a computer: register the clock, keyboard and display, map their
    /// registers at the configured bases and hook them into memory.
    pub fn with_config(config: MachineConfig) -> Result<Self, ComputerError> {
        config.validate()?;
        let mut cpu = Cpu::with_memory(Memory::with_capacity(config.memory_words));
        let clock = Rc::new(RefCell::new(Clock::new(config.clock_rate_hz)));
        let keyboard = Rc::new(RefCell::new(Keyboard::new()));
        let display = Rc::new(RefCell::new(Display::new()));

        let mut bus = DeviceBus::new();
        bus.register_device(clock.clone());
        bus.register_device(keyboard.clone());
        bus.register_device(display.clone());
        bus.map(CLOCK_ID, config.clock_base)?;
        bus.map(KEYBOARD_ID, config.keyboard_base)?;
        bus.map(DISPLAY_ID, config.display_base)?;
        bus.attach(&mut cpu.mem)?;

        Ok(Self {
            cpu,
            bus,
            config,
            clock,
            keyboard,
            display,
            vram_window: None,
        })
    }

    /// Assemble `source`, load it at address 0 and reset the CPU.
    ///
    /// Returns the program size in words. Nothing is loaded if assembly fails.
    pub fn load_assembly(&mut self, source: &str) -> Result<usize, ComputerError> {
        let words = assemble(source)?;
        self.load_image(&words)?;
        Ok(words.len())
    }

    /// Load a word buffer at address 0 and reset the CPU.
    pub fn load_image(&mut self, words: &[Word]) -> Result<(), ComputerError> {
        self.cpu.load_program(words)?;
        self.cpu.reset();
        self.rewire_display()?;
        tracing::debug!(words = words.len(), "program loaded");
        Ok(())
    }

    /// Execute `cycles` instructions, then tick every device once.
    pub fn run(&mut self, cycles: u64) -> Result<(), ComputerError> {
        self.cpu.exec(cycles)?;
        self.tick_devices()
    }

    /// Run one frame's worth of cycles.
    pub fn run_frame(&mut self) -> Result<(), ComputerError> {
        self.run(self.config.cycles_per_frame)
    }

    /// Execute a single instruction without ticking devices. The VRAM
    /// watches still follow a display base written by this instruction.
    pub fn step(&mut self) -> Result<Instruction, ComputerError> {
        let instr = self.cpu.step()?;
        self.rewire_display()?;
        Ok(instr)
    }

    /// Tick every device once and pick up display reconfiguration.
    pub fn tick_devices(&mut self) -> Result<(), ComputerError> {
        self.bus.update(&mut self.cpu)?;
        self.rewire_display()
    }

    /// Reset the CPU. Memory and device state are kept.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Forward a key press to the keyboard.
    pub fn key_down(&mut self, code: Word) -> Result<bool, ComputerError> {
        Ok(self.keyboard.borrow_mut().key_down(code, &mut self.cpu)?)
    }

    /// Forward a key release to the keyboard.
    pub fn key_up(&mut self, code: Word) {
        self.keyboard.borrow_mut().key_up(code);
    }

    /// Whether the frame changed since the last call.
    pub fn take_frame_dirty(&mut self) -> bool {
        self.display.borrow_mut().take_dirty()
    }

    pub fn registers(&self) -> &Registers {
        &self.cpu.regs
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn clock(&self) -> Ref<'_, Clock> {
        self.clock.borrow()
    }

    pub fn keyboard(&self) -> Ref<'_, Keyboard> {
        self.keyboard.borrow()
    }

    pub fn display(&self) -> Ref<'_, Display> {
        self.display.borrow()
    }

    /// Move the VRAM watches to follow the display's VRAM base.
    fn rewire_display(&mut self) -> Result<(), ComputerError> {
        let window = self.display.borrow().vram_window();
        if window == self.vram_window {
            return Ok(());
        }

        let capacity = self.cpu.mem.capacity();
        if let Some(old) = self.vram_window.take() {
            for addr in old.filter(|&a| a < capacity) {
                self.cpu.mem.unwatch(addr)?;
            }
        }
        if let Some(new) = &window {
            for addr in new.clone().filter(|&a| a < capacity) {
                self.cpu.mem.watch(addr, VramWatch::new(Rc::clone(&self.display)))?;
            }
        }
        tracing::debug!(?window, "vram window moved");
        self.vram_window = window;

        // Device registers win where the window overlaps them.
        self.bus.attach(&mut self.cpu.mem)?;
        Ok(())
    }
}

/// Errors surfaced by the computer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputerError {
    #[error("assembly failed: {0}")]
    AssemblerError(#[from] AssemblerError),

    #[error("cpu fault: {0}")]
    CpuError(#[from] CpuError),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("bus error: {0}")]
    BusError(#[from] BusError),

    #[error("image error: {0}")]
    ImageError(#[from] ImageError),

    #[error("config error: {0}")]
    ConfigError(#[from] ConfigError),
}
