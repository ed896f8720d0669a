//! Assembler, disassembler and program images.
//!
//! This module provides:
//! - A two-pass assembler (text → word buffer)
//! - A disassembler (words → readable text)
//! - A hex text image format for assembled programs

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, assemble_program, AssemblerError, Program};
pub use disasm::{disassemble, disassemble_at, disassemble_instruction};
pub use image::{format_image, load_image, parse_image, save_image, ImageError};
