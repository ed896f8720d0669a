//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and device state panels
//! - Memory view, eight words per row
//! - Step/run/breakpoint controls
//! - Disassembly from PC
//! - Keyboard passthrough to the emulated machine

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
