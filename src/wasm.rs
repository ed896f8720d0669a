//! WebAssembly bindings.
//!
//! JavaScript-friendly wrapper around [`Computer`]. The page drives the frame
//! loop, translates DOM key events to scancodes and renders VRAM itself.

use crate::asm::{assemble, disassemble_at};
use crate::cpu::Word;
use crate::{Computer, MachineConfig};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly computer wrapper.
#[wasm_bindgen]
pub struct WasmComputer {
    computer: Computer,
    program: Vec<Word>,
}

#[wasm_bindgen]
impl WasmComputer {
    /// Create a computer with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmComputer, JsError> {
        Ok(Self {
            computer: Computer::new().map_err(js_err)?,
            program: Vec::new(),
        })
    }

    /// Create a computer from a JSON machine configuration.
    #[wasm_bindgen]
    pub fn with_config(json: &str) -> Result<WasmComputer, JsError> {
        let config = MachineConfig::from_json(json).map_err(js_err)?;
        Ok(Self {
            computer: Computer::with_config(config).map_err(js_err)?,
            program: Vec::new(),
        })
    }

    /// Assemble and load a program. Returns its size in words.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let words = assemble(source).map_err(js_err)?;
        self.computer.load_image(&words).map_err(js_err)?;
        self.program = words;
        Ok(self.program.len())
    }

    /// Load a raw word image.
    #[wasm_bindgen]
    pub fn load_words(&mut self, words: &[u16]) -> Result<(), JsError> {
        self.computer.load_image(words).map_err(js_err)?;
        self.program = words.to_vec();
        Ok(())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let pc = self.computer.registers().pc;
        let text = disassemble_at(&self.computer.cpu.mem, pc, 1)
            .into_iter()
            .next()
            .map(|(_, text)| text)
            .unwrap_or_default();
        self.computer.step().map_err(js_err)?;
        Ok(text)
    }

    /// Execute `cycles` instructions then tick devices. Returns the total
    /// cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, cycles: u32) -> Result<u64, JsError> {
        self.computer.run(u64::from(cycles)).map_err(js_err)?;
        Ok(self.computer.cpu.cycles)
    }

    /// Run one configured frame.
    #[wasm_bindgen]
    pub fn run_frame(&mut self) -> Result<(), JsError> {
        self.computer.run_frame().map_err(js_err)
    }

    /// Reload the program and reset the CPU.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.computer.load_image(&self.program).map_err(js_err)
    }

    /// Forward a key press (already translated to a scancode).
    #[wasm_bindgen]
    pub fn key_down(&mut self, code: u16) -> Result<bool, JsError> {
        self.computer.key_down(code).map_err(js_err)
    }

    /// Forward a key release.
    #[wasm_bindgen]
    pub fn key_up(&mut self, code: u16) {
        self.computer.key_up(code);
    }

    /// Whether the frame needs redrawing. Clears the flag.
    #[wasm_bindgen]
    pub fn take_frame_dirty(&mut self) -> bool {
        self.computer.take_frame_dirty()
    }

    /// VRAM base, or 0 when the display is disconnected.
    #[wasm_bindgen]
    pub fn vram_base(&self) -> u16 {
        self.computer.display().vram_base()
    }

    /// Border color index.
    #[wasm_bindgen]
    pub fn border(&self) -> u16 {
        self.computer.display().border()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.computer.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.computer.registers().pc
    }

    /// Raw memory word, without triggering device reads. 0 past the end.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u16 {
        self.computer.cpu.mem.peek(addr).unwrap_or(0)
    }

    /// Copy `len` words starting at `addr`.
    #[wasm_bindgen]
    pub fn memory_range(&self, addr: usize, len: usize) -> js_sys::Uint16Array {
        let words: Vec<u16> = self
            .computer
            .cpu
            .mem
            .dump(addr, len)
            .into_iter()
            .map(|(_, w)| w)
            .collect();
        js_sys::Uint16Array::from(&words[..])
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(self.computer.registers()).map_err(js_err)
    }

    /// Disassemble `count` instructions from PC, one per line.
    #[wasm_bindgen]
    pub fn disassembly(&self, count: usize) -> String {
        disassemble_at(&self.computer.cpu.mem, self.computer.registers().pc, count)
            .into_iter()
            .map(|(addr, text)| format!("{addr:04x}: {text}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Assemble source code and return the words.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u16>, JsError> {
    assemble(source).map_err(js_err)
}
