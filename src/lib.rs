//! # dcpu
//!
//! A self-contained 16-bit virtual computer.
//!
//! A two-pass assembler turns mnemonics into machine words, a CPU executes
//! them against 64K words of memory, and memory-mapped devices (clock,
//! keyboard, display registers) observe memory traffic and raise interrupts.

pub mod cpu;
pub mod asm;
pub mod hw;
pub mod config;
pub mod computer;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, Instruction, Memory, MemoryError, Registers, Word};
pub use asm::{assemble, disassemble, load_image, save_image, AssemblerError, ImageError};
pub use hw::{Device, DeviceBus};
pub use config::{ConfigError, MachineConfig};
pub use computer::{Computer, ComputerError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
