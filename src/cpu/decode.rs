//! Instruction word layout and operand encodings.
//!
//! A 16-bit instruction word is laid out as:
//! - bits 0-3: opcode
//! - bits 4-9: operand `a` (destination / first operand)
//! - bits 10-15: operand `b` (source / second operand)
//!
//! Operand encodings that need an extra word take it from the words that
//! follow the instruction, `a`'s first.

use crate::cpu::memory::Word;
use crate::cpu::registers::Register;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every mnemonic the assembler knows, with its opcode table value.
///
/// Only values below 0x10 fit the 4-bit opcode field, and of those only the
/// ones with an [`Opcode`] variant are executable.
pub const OPCODE_TABLE: [(&str, u8); 27] = [
    ("SET", 0x01),
    ("ADD", 0x02),
    ("SUB", 0x03),
    ("MUL", 0x04),
    ("MLI", 0x05),
    ("DIV", 0x06),
    ("DVI", 0x07),
    ("MOD", 0x08),
    ("MDI", 0x09),
    ("AND", 0x0A),
    ("BOR", 0x0B),
    ("XOR", 0x0C),
    ("SHR", 0x0D),
    ("ASR", 0x0E),
    ("SHL", 0x0F),
    ("IFB", 0x10),
    ("IFC", 0x11),
    ("IFE", 0x12),
    ("IFN", 0x13),
    ("IFG", 0x14),
    ("IFA", 0x15),
    ("IFL", 0x16),
    ("IFU", 0x17),
    ("ADX", 0x1A),
    ("SBX", 0x1B),
    ("STI", 0x1E),
    ("STD", 0x1F),
];

/// Width mask of the opcode field.
pub const OPCODE_MASK: Word = 0xF;

/// Look up a mnemonic's table value. Case-insensitive.
pub fn opcode_for(mnemonic: &str) -> Option<u8> {
    let upper = mnemonic.to_ascii_uppercase();
    OPCODE_TABLE
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|&(_, value)| value)
}

/// Look up the mnemonic for a 4-bit opcode field value.
pub fn mnemonic_for(value: u8) -> Option<&'static str> {
    if value == 0 {
        return Some("NOP");
    }
    OPCODE_TABLE
        .iter()
        .find(|&&(_, v)| v == value)
        .map(|&(name, _)| name)
}

/// Split a raw word into `(opcode, a, b)` fields.
#[inline]
pub fn fields(word: Word) -> (u8, u8, u8) {
    (
        (word & OPCODE_MASK) as u8,
        ((word >> 4) & 0x3F) as u8,
        ((word >> 10) & 0x3F) as u8,
    )
}

/// An executable opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Nop = 0x00,
    Set = 0x01,
    Add = 0x02,
    Sub = 0x03,
    Mul = 0x04,
    Mli = 0x05,
    Div = 0x06,
    And = 0x0A,
    Bor = 0x0B,
    Xor = 0x0C,
    Shr = 0x0D,
    Asr = 0x0E,
    Shl = 0x0F,
}

impl Opcode {
    /// Decode an opcode field value.
    pub fn from_value(value: u8) -> Result<Self, DecodeError> {
        let op = match value {
            0x00 => Opcode::Nop,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Sub,
            0x04 => Opcode::Mul,
            0x05 => Opcode::Mli,
            0x06 => Opcode::Div,
            0x0A => Opcode::And,
            0x0B => Opcode::Bor,
            0x0C => Opcode::Xor,
            0x0D => Opcode::Shr,
            0x0E => Opcode::Asr,
            0x0F => Opcode::Shl,
            other => return Err(DecodeError::UnknownOpcode(other)),
        };
        Ok(op)
    }

    /// The opcode field value.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        mnemonic_for(self.value()).unwrap_or("???")
    }

    /// Whether the opcode assigns to operand `a` and so refuses literal
    /// destinations.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Opcode::Set
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Mli
                | Opcode::And
                | Opcode::Bor
                | Opcode::Xor
                | Opcode::Shr
                | Opcode::Asr
                | Opcode::Shl
        )
    }
}

/// A decoded 6-bit operand encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// 0x00-0x07: register
    Register(Register),
    /// 0x08-0x0F: [register]
    Indirect(Register),
    /// 0x10-0x17: [register + next word]
    IndirectOffset(Register),
    /// 0x18: POP when read, PUSH when written
    Stack,
    /// 0x19: [SP]
    Peek,
    /// 0x1A: [SP + next word]
    Pick,
    /// 0x1B
    Sp,
    /// 0x1C
    Pc,
    /// 0x1D
    Ex,
    /// 0x1E: [next word]
    IndirectNext,
    /// 0x1F: next word as a literal
    NextLiteral,
    /// 0x20-0x3F: literal 0..=31
    Inline(Word),
}

/// Largest literal that packs into the operand field.
pub const INLINE_LITERAL_MAX: Word = 0x1F;

impl Operand {
    /// Decode a 6-bit operand field.
    pub fn from_code(code: u8) -> Self {
        let code = code & 0x3F;
        match code {
            0x00..=0x07 => Operand::Register(Register::from_index(code)),
            0x08..=0x0F => Operand::Indirect(Register::from_index(code)),
            0x10..=0x17 => Operand::IndirectOffset(Register::from_index(code)),
            0x18 => Operand::Stack,
            0x19 => Operand::Peek,
            0x1A => Operand::Pick,
            0x1B => Operand::Sp,
            0x1C => Operand::Pc,
            0x1D => Operand::Ex,
            0x1E => Operand::IndirectNext,
            0x1F => Operand::NextLiteral,
            _ => Operand::Inline(Word::from(code - 0x20)),
        }
    }

    /// Encode back to the 6-bit field.
    pub fn code(self) -> u8 {
        match self {
            Operand::Register(r) => r.index(),
            Operand::Indirect(r) => 0x08 + r.index(),
            Operand::IndirectOffset(r) => 0x10 + r.index(),
            Operand::Stack => 0x18,
            Operand::Peek => 0x19,
            Operand::Pick => 0x1A,
            Operand::Sp => 0x1B,
            Operand::Pc => 0x1C,
            Operand::Ex => 0x1D,
            Operand::IndirectNext => 0x1E,
            Operand::NextLiteral => 0x1F,
            Operand::Inline(v) => 0x20 + (v & INLINE_LITERAL_MAX) as u8,
        }
    }

    /// Whether resolving this operand consumes the next word.
    pub fn uses_next_word(self) -> bool {
        matches!(
            self,
            Operand::IndirectOffset(_) | Operand::Pick | Operand::IndirectNext | Operand::NextLiteral
        )
    }

    /// Whether this operand is a literal (and therefore cannot be assigned to).
    pub fn is_literal(self) -> bool {
        matches!(self, Operand::NextLiteral | Operand::Inline(_))
    }
}

/// A decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub a: Operand,
    pub b: Operand,
}

impl Instruction {
    /// Number of words this instruction occupies, including extra operand words.
    pub fn size(&self) -> usize {
        1 + usize::from(self.a.uses_next_word()) + usize::from(self.b.uses_next_word())
    }
}

/// Decode an instruction word.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let (op, a, b) = fields(word);
    Ok(Instruction {
        opcode: Opcode::from_value(op)?,
        a: Operand::from_code(a),
        b: Operand::from_code(b),
    })
}

/// Encode an instruction back to its word (extra operand words not included).
pub fn encode(instr: &Instruction) -> Word {
    Word::from(instr.opcode.value())
        | (Word::from(instr.a.code()) << 4)
        | (Word::from(instr.b.code()) << 10)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
}
