//! Buffered keyboard.
//!
//! Key events arrive already translated to scancodes. Registers:
//! - 0: read pops the oldest buffered key (0 when empty); write sets the
//!   interrupt message
//! - 1: read gives the last key pressed; write clears the buffer
//! - 2: read gives 1 while the last key is held, else 0

use crate::cpu::{CpuError, Word};
use crate::hw::{Device, InterruptLine};
use std::collections::{BTreeSet, VecDeque};

/// Hardware id of the keyboard.
pub const KEYBOARD_ID: u32 = 0x30cf_7406;

#[derive(Debug, Clone, Default)]
pub struct Keyboard {
    buffer: VecDeque<Word>,
    last_key: Word,
    /// Keys currently down.
    held: BTreeSet<Word>,
    message: Word,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys waiting to be read.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Key pressed. Auto-repeat of any key still held is ignored.
    /// Returns whether the key was buffered.
    pub fn key_down(&mut self, code: Word, cpu: &mut dyn InterruptLine) -> Result<bool, CpuError> {
        if !self.held.insert(code) {
            return Ok(false);
        }

        self.buffer.push_back(code);
        self.last_key = code;
        tracing::trace!(code, pending = self.buffer.len(), "key down");

        if self.message != 0 {
            cpu.interrupt(self.message)?;
        }
        Ok(true)
    }

    /// Key released. Only the held state changes; the buffer is kept.
    pub fn key_up(&mut self, code: Word) {
        self.held.remove(&code);
    }

    /// Whether `code` is currently down.
    pub fn is_held(&self, code: Word) -> bool {
        self.held.contains(&code)
    }
}

impl Device for Keyboard {
    fn hardware_id(&self) -> u32 {
        KEYBOARD_ID
    }

    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn register_count(&self) -> Word {
        3
    }

    fn on_memory_read(&mut self, register: Word) -> Word {
        match register {
            0 => self.buffer.pop_front().unwrap_or(0),
            1 => self.last_key,
            2 => Word::from(self.is_held(self.last_key)),
            _ => 0,
        }
    }

    fn on_memory_write(&mut self, register: Word, value: Word) {
        match register {
            0 => self.message = value,
            1 => self.buffer.clear(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{Cpu, Register};

    #[test]
    fn test_buffer_is_fifo() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        kb.key_down(b'X'.into(), &mut cpu).unwrap();
        kb.key_down(b'Y'.into(), &mut cpu).unwrap();

        assert_eq!(kb.on_memory_read(0), Word::from(b'X'));
        assert_eq!(kb.on_memory_read(0), Word::from(b'Y'));
        assert_eq!(kb.on_memory_read(0), 0);
    }

    #[test]
    fn test_auto_repeat_ignored() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        assert!(kb.key_down(30, &mut cpu).unwrap());
        assert!(!kb.key_down(30, &mut cpu).unwrap());
        assert_eq!(kb.pending(), 1);

        kb.key_up(30);
        assert!(kb.key_down(30, &mut cpu).unwrap());
        assert_eq!(kb.pending(), 2);
    }

    #[test]
    fn test_held_state_and_last_key() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        kb.key_down(17, &mut cpu).unwrap();
        assert_eq!(kb.on_memory_read(1), 17);
        assert_eq!(kb.on_memory_read(2), 1);

        kb.key_up(17);
        assert_eq!(kb.on_memory_read(2), 0);
        // Key-up never touches the buffer.
        assert_eq!(kb.pending(), 1);
    }

    #[test]
    fn test_clear_buffer() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        kb.key_down(1, &mut cpu).unwrap();
        kb.key_down(2, &mut cpu).unwrap();
        kb.on_memory_write(1, 0);
        assert_eq!(kb.pending(), 0);
        assert_eq!(kb.on_memory_read(1), 2);
    }

    #[test]
    fn test_key_interrupt() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        kb.on_memory_write(0, 0x20);

        // Masked while IA is 0.
        kb.key_down(5, &mut cpu).unwrap();
        assert_eq!(cpu.regs.pc, 0);

        cpu.regs.ia = 0x400;
        kb.key_down(6, &mut cpu).unwrap();
        assert_eq!(cpu.regs.pc, 0x400);
        assert_eq!(cpu.regs.get(Register::A), 0x20);
    }

    #[test]
    fn test_repeat_of_earlier_held_key_ignored() {
        let mut kb = Keyboard::new();
        let mut cpu = Cpu::new();
        assert!(kb.key_down(b'X'.into(), &mut cpu).unwrap());
        assert!(kb.key_down(b'Y'.into(), &mut cpu).unwrap());
        assert!(!kb.key_down(b'X'.into(), &mut cpu).unwrap());
        assert_eq!(kb.pending(), 2);
        assert_eq!(kb.on_memory_read(1), Word::from(b'Y'));

        // Releasing the older key leaves the last one held.
        kb.key_up(b'X'.into());
        assert_eq!(kb.on_memory_read(2), 1);
        assert!(!kb.is_held(b'X'.into()));

        kb.key_up(b'Y'.into());
        assert_eq!(kb.on_memory_read(2), 0);
    }
}
