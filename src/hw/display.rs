//! Display controller registers.
//!
//! Pixels are produced elsewhere; this device only tracks where the frame
//! lives and whether it changed since the renderer last looked. Registers:
//! - 0: VRAM base (0 disconnects the screen)
//! - 1: font base
//! - 2: palette base
//! - 3: border color (low 4 bits)

use crate::cpu::{Observer, Word};
use crate::hw::Device;
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

/// Hardware id of the display.
pub const DISPLAY_ID: u32 = 0x7349_f615;

/// Words in the VRAM window (32x12 cells).
pub const VRAM_WORDS: usize = 32 * 12;

#[derive(Debug, Clone, Default)]
pub struct Display {
    vram_base: Word,
    font_base: Word,
    palette_base: Word,
    border: Word,
    dirty: bool,
}

impl Display {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vram_base(&self) -> Word {
        self.vram_base
    }

    pub fn font_base(&self) -> Word {
        self.font_base
    }

    pub fn palette_base(&self) -> Word {
        self.palette_base
    }

    pub fn border(&self) -> Word {
        self.border
    }

    /// Addresses of the live VRAM window, if connected.
    pub fn vram_window(&self) -> Option<Range<usize>> {
        if self.vram_base == 0 {
            return None;
        }
        let start = usize::from(self.vram_base);
        Some(start..(start + VRAM_WORDS).min(crate::cpu::MEMORY_SIZE))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return and clear the dirty flag. Called by the renderer.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// A word inside the VRAM window changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Device for Display {
    fn hardware_id(&self) -> u32 {
        DISPLAY_ID
    }

    fn name(&self) -> &'static str {
        "display"
    }

    fn register_count(&self) -> Word {
        4
    }

    fn on_memory_read(&mut self, register: Word) -> Word {
        match register {
            0 => self.vram_base,
            1 => self.font_base,
            2 => self.palette_base,
            3 => self.border,
            _ => 0,
        }
    }

    fn on_memory_write(&mut self, register: Word, value: Word) {
        match register {
            0 => self.vram_base = value,
            1 => self.font_base = value,
            2 => self.palette_base = value,
            3 => self.border = value & 0xF,
            _ => return,
        }
        self.dirty = true;
    }
}

/// Memory observer placed on each VRAM address.
pub struct VramWatch {
    display: Rc<RefCell<Display>>,
}

impl VramWatch {
    pub fn new(display: Rc<RefCell<Display>>) -> Self {
        Self { display }
    }
}

impl Observer for VramWatch {
    fn on_write(&mut self, _value: Word) {
        if let Ok(mut display) = self.display.try_borrow_mut() {
            display.mark_dirty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Memory;

    #[test]
    fn test_control_registers() {
        let mut display = Display::new();
        display.on_memory_write(0, 0x8000);
        display.on_memory_write(1, 0x8180);
        display.on_memory_write(2, 0x8280);
        display.on_memory_write(3, 0x1234);

        assert_eq!(display.on_memory_read(0), 0x8000);
        assert_eq!(display.on_memory_read(1), 0x8180);
        assert_eq!(display.on_memory_read(2), 0x8280);
        assert_eq!(display.on_memory_read(3), 0x4);
    }

    #[test]
    fn test_register_write_marks_dirty() {
        let mut display = Display::new();
        assert!(!display.is_dirty());
        display.on_memory_write(3, 1);
        assert!(display.take_dirty());
        assert!(!display.is_dirty());

        // Writes past the register window are ignored.
        display.on_memory_write(9, 1);
        assert!(!display.is_dirty());
    }

    #[test]
    fn test_vram_window() {
        let mut display = Display::new();
        assert_eq!(display.vram_window(), None);

        display.on_memory_write(0, 0x8000);
        assert_eq!(display.vram_window(), Some(0x8000..0x8180));

        display.on_memory_write(0, 0xFF00);
        assert_eq!(display.vram_window(), Some(0xFF00..0x10000));
    }

    #[test]
    fn test_vram_watch_marks_dirty() {
        let display = Rc::new(RefCell::new(Display::new()));
        let mut mem = Memory::new();
        mem.watch(0x8005, VramWatch::new(Rc::clone(&display))).unwrap();

        mem.write(0x8005, b'A'.into()).unwrap();
        assert!(display.borrow_mut().take_dirty());
    }
}
