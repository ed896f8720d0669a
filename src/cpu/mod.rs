//! CPU emulation.
//!
//! This module implements the 16-bit machine core:
//! - 64K words of memory with per-address observers
//! - 8 general purpose registers plus PC, SP, EX and IA
//! - 4-bit opcode / 6-bit operand instruction words

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError, Observer, Word, MEMORY_SIZE};
pub use registers::{Register, Registers};
pub use decode::{Instruction, Opcode, Operand, DecodeError};
pub use execute::{Cpu, CpuError};
