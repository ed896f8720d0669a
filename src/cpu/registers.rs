//! CPU register file.
//!
//! Eight general purpose registers (A, B, C, X, Y, Z, I, J) plus:
//! - PC: program counter, starts at 0
//! - SP: stack pointer, starts at 0xFFFF and grows downward
//! - EX: overflow / extra register
//! - IA: interrupt address, interrupts are masked while it is 0

use crate::cpu::memory::Word;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initial (and reset) value of the stack pointer.
pub const SP_RESET: Word = 0xFFFF;

/// A general purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    A,
    B,
    C,
    X,
    Y,
    Z,
    I,
    J,
}

impl Register {
    /// All general purpose registers in encoding order.
    pub const ALL: [Register; 8] = [
        Register::A,
        Register::B,
        Register::C,
        Register::X,
        Register::Y,
        Register::Z,
        Register::I,
        Register::J,
    ];

    /// Register from its 3-bit encoding index.
    pub fn from_index(index: u8) -> Self {
        Self::ALL[usize::from(index & 0x7)]
    }

    /// The 3-bit encoding index.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Parse a register name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "A" => Some(Register::A),
            "B" => Some(Register::B),
            "C" => Some(Register::C),
            "X" => Some(Register::X),
            "Y" => Some(Register::Y),
            "Z" => Some(Register::Z),
            "I" => Some(Register::I),
            "J" => Some(Register::J),
            _ => None,
        }
    }

    /// Assembly name of the register.
    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::X => "X",
            Register::Y => "Y",
            Register::Z => "Z",
            Register::I => "I",
            Register::J => "J",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General purpose registers, indexed by [`Register::index`].
    pub gp: [Word; 8],
    /// Program counter.
    pub pc: Word,
    /// Stack pointer.
    pub sp: Word,
    /// Overflow / extra register.
    pub ex: Word,
    /// Interrupt address.
    pub ia: Word,
}

impl Registers {
    /// Create a register file in its reset state.
    pub fn new() -> Self {
        Self {
            gp: [0; 8],
            pc: 0,
            sp: SP_RESET,
            ex: 0,
            ia: 0,
        }
    }

    /// Zero everything except SP, which goes back to 0xFFFF.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general purpose register.
    #[inline]
    pub fn get(&self, reg: Register) -> Word {
        self.gp[usize::from(reg.index())]
    }

    /// Write a general purpose register.
    #[inline]
    pub fn set(&mut self, reg: Register, value: Word) {
        self.gp[usize::from(reg.index())] = value;
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> Word {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Whether interrupts are enabled (IA != 0).
    pub fn interrupts_enabled(&self) -> bool {
        self.ia != 0
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in Register::ALL {
            write!(f, "{}={:04x} ", reg, self.get(reg))?;
        }
        write!(
            f,
            "PC={:04x} SP={:04x} EX={:04x} IA={:04x}",
            self.pc, self.sp, self.ex, self.ia
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let regs = Registers::new();
        assert_eq!(regs.gp, [0; 8]);
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.sp, 0xFFFF);
        assert!(!regs.interrupts_enabled());
    }

    #[test]
    fn test_reset_restores_sp() {
        let mut regs = Registers::new();
        regs.set(Register::J, 7);
        regs.sp = 0x1000;
        regs.ia = 0x40;
        regs.ex = 1;

        regs.reset();

        assert_eq!(regs, Registers::new());
    }

    #[test]
    fn test_register_names() {
        for reg in Register::ALL {
            assert_eq!(Register::parse(reg.name()), Some(reg));
            assert_eq!(Register::parse(&reg.name().to_lowercase()), Some(reg));
            assert_eq!(Register::from_index(reg.index()), reg);
        }
        assert_eq!(Register::parse("SP"), None);
    }

    #[test]
    fn test_advance_pc_wraps() {
        let mut regs = Registers::new();
        regs.pc = 0xFFFF;

        let old = regs.advance_pc();
        assert_eq!(old, 0xFFFF);
        assert_eq!(regs.pc, 0);
    }
}
