//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle, operand resolution and all
//! instruction behaviors. One "cycle" is one instruction.

use crate::cpu::decode::{self, DecodeError, Instruction, Opcode, Operand};
use crate::cpu::memory::{MemoryError, Word};
use crate::cpu::registers::Register;
use crate::cpu::{Memory, Registers};
use thiserror::Error;

/// Where an operand lives once its extra word (if any) has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Register(Register),
    Memory(Word),
    /// Pop on read, push on write.
    Stack,
    Sp,
    Pc,
    Ex,
    Literal(Word),
}

/// The CPU: register file plus the memory it executes from.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a CPU with a zeroed 64K-word memory.
    pub fn new() -> Self {
        Self::with_memory(Memory::new())
    }

    /// Create a CPU around an existing memory.
    pub fn with_memory(mem: Memory) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset registers (SP back to 0xFFFF). Memory is left untouched.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Copy a program image to address 0.
    pub fn load_program(&mut self, program: &[Word]) -> Result<(), MemoryError> {
        self.mem.load(0, program)
    }

    /// Execute `cycles` instructions.
    ///
    /// The first fault aborts the call; instructions already executed stay
    /// executed.
    pub fn exec(&mut self, cycles: u64) -> Result<(), CpuError> {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. On a decode
    /// fault or an illegal write, PC is left pointing at the faulting word.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        // Fetch
        let pc = self.regs.pc;
        let raw = self.mem.read(usize::from(pc))?;
        self.regs.advance_pc();

        // Decode
        let instr = match decode::decode(raw) {
            Ok(instr) => instr,
            Err(e) => {
                self.regs.pc = pc;
                return Err(e.into());
            }
        };
        if instr.opcode.is_write() && instr.a.is_literal() {
            self.regs.pc = pc;
            return Err(CpuError::IllegalWrite {
                pc,
                operand: instr.a.code(),
            });
        }

        tracing::trace!(pc, ?instr, "exec");

        // Execute
        self.execute(instr)?;

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Deliver an interrupt.
    ///
    /// With IA == 0 the interrupt is dropped and `Ok(false)` is returned.
    /// Otherwise PC and then A are pushed, PC jumps to IA and A receives
    /// the message.
    pub fn interrupt(&mut self, message: Word) -> Result<bool, CpuError> {
        if !self.regs.interrupts_enabled() {
            tracing::trace!(message, "interrupt masked");
            return Ok(false);
        }

        self.push(self.regs.pc)?;
        self.push(self.regs.get(Register::A))?;
        self.regs.pc = self.regs.ia;
        self.regs.set(Register::A, message);

        tracing::trace!(message, ia = self.regs.ia, "interrupt delivered");
        Ok(true)
    }

    /// Push a word: SP is decremented before the store.
    pub fn push(&mut self, value: Word) -> Result<(), CpuError> {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.mem.write(usize::from(self.regs.sp), u32::from(value))?;
        Ok(())
    }

    /// Pop a word: SP is incremented after the load.
    pub fn pop(&mut self) -> Result<Word, CpuError> {
        let value = self.mem.read(usize::from(self.regs.sp))?;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        Ok(value)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        if instr.opcode == Opcode::Nop {
            return Ok(());
        }

        let dst = self.resolve(instr.a)?;
        let src = self.resolve(instr.b)?;
        let b = self.load(src)?;

        if instr.opcode == Opcode::Set {
            return self.store(dst, u32::from(b));
        }

        let a = self.load(dst)?;
        let (a32, b32) = (u32::from(a), u32::from(b));

        let (result, ex) = match instr.opcode {
            Opcode::Add => {
                let sum = a32 + b32;
                (sum, Some(Word::from(sum > 0xFFFF)))
            }

            Opcode::Sub => {
                let diff = i32::from(a) - i32::from(b);
                (diff as u32, Some(if diff < 0 { 0xFFFF } else { 0 }))
            }

            Opcode::Mul => {
                let product = a32 * b32;
                (product, Some((product >> 16) as Word))
            }

            Opcode::Mli => {
                let product = (i32::from(a as i16) * i32::from(b as i16)) as u32;
                (product, Some((product >> 16) as Word))
            }

            Opcode::Div => {
                if b == 0 {
                    (0, Some(0))
                } else {
                    let ex = ((a32 % b32) << 16) / b32;
                    (a32 / b32, Some(ex as Word))
                }
            }

            Opcode::And => (a32 & b32, None),
            Opcode::Bor => (a32 | b32, None),
            Opcode::Xor => (a32 ^ b32, None),

            // Shift counts follow 32-bit wrap-around semantics.
            Opcode::Shr => (a32.wrapping_shr(b32), Some(shifted_out(a32, b32))),
            Opcode::Asr => {
                let shifted = i32::from(a as i16).wrapping_shr(b32) as u32;
                (shifted, Some(shifted_out(a32, b32)))
            }
            Opcode::Shl => (a32.wrapping_shl(b32), Some(shifted_out(a32, b32))),

            Opcode::Nop | Opcode::Set => (b32, None),
        };

        if let Some(ex) = ex {
            self.regs.ex = ex;
        }
        self.store(dst, result)
    }

    /// Consume an operand's extra word (if any) and work out where it lives.
    fn resolve(&mut self, operand: Operand) -> Result<Location, CpuError> {
        let loc = match operand {
            Operand::Register(r) => Location::Register(r),
            Operand::Indirect(r) => Location::Memory(self.regs.get(r)),
            Operand::IndirectOffset(r) => {
                let offset = self.next_word()?;
                Location::Memory(self.regs.get(r).wrapping_add(offset))
            }
            Operand::Stack => Location::Stack,
            Operand::Peek => Location::Memory(self.regs.sp),
            Operand::Pick => {
                let offset = self.next_word()?;
                Location::Memory(self.regs.sp.wrapping_add(offset))
            }
            Operand::Sp => Location::Sp,
            Operand::Pc => Location::Pc,
            Operand::Ex => Location::Ex,
            Operand::IndirectNext => Location::Memory(self.next_word()?),
            Operand::NextLiteral => Location::Literal(self.next_word()?),
            Operand::Inline(v) => Location::Literal(v),
        };
        Ok(loc)
    }

    fn next_word(&mut self) -> Result<Word, CpuError> {
        let addr = self.regs.advance_pc();
        Ok(self.mem.read(usize::from(addr))?)
    }

    fn load(&mut self, loc: Location) -> Result<Word, CpuError> {
        let value = match loc {
            Location::Register(r) => self.regs.get(r),
            Location::Memory(addr) => self.mem.read(usize::from(addr))?,
            Location::Stack => self.pop()?,
            Location::Sp => self.regs.sp,
            Location::Pc => self.regs.pc,
            Location::Ex => self.regs.ex,
            Location::Literal(v) => v,
        };
        Ok(value)
    }

    /// Store a result, truncated to 16 bits. Stores to literals are dropped.
    fn store(&mut self, loc: Location, value: u32) -> Result<(), CpuError> {
        let word = (value & 0xFFFF) as Word;
        match loc {
            Location::Register(r) => self.regs.set(r, word),
            Location::Memory(addr) => self.mem.write(usize::from(addr), value)?,
            Location::Stack => self.push(word)?,
            Location::Sp => self.regs.sp = word,
            Location::Pc => self.regs.pc = word,
            Location::Ex => self.regs.ex = word,
            Location::Literal(_) => {}
        }
        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }
}

/// Bits a shift by `count` pushes out of the low 16, as EX sees them.
fn shifted_out(a: u32, count: u32) -> Word {
    (a.wrapping_shl(16u32.wrapping_sub(count)) & 0xFFFF) as Word
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("illegal write to literal operand {operand:#04x} at {pc:#06x}")]
    IllegalWrite { pc: Word, operand: u8 },
}
