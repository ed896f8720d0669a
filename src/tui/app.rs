//! Debugger application state and logic.

use crate::asm::disasm::{disassemble_at, disassemble_instruction};
use crate::cpu::Word;
use crate::Computer;
use std::collections::BTreeSet;

/// Words shown per memory row.
pub const WORDS_PER_ROW: usize = 8;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub computer: Computer,
    /// Loaded image, kept for reset.
    pub program: Vec<Word>,
    /// Breakpoints (by address).
    pub breakpoints: BTreeSet<Word>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Are key presses forwarded to the emulated keyboard?
    pub capture_keys: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First memory row shown.
    pub mem_row: usize,
    /// Instructions executed since the last device tick.
    since_tick: u64,
}

impl DebuggerApp {
    /// Create a debugger around a computer with `program` already loaded.
    pub fn new(computer: Computer, program: Vec<Word>) -> Self {
        Self {
            computer,
            program,
            breakpoints: BTreeSet::new(),
            running: false,
            capture_keys: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_row: 0,
            since_tick: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        let pc = self.computer.registers().pc;
        let window = self.window_at(pc);
        match self.computer.step() {
            Ok(_) => {
                let (text, _) = disassemble_instruction(&window);
                self.status = format!("PC={pc:04x}: {text}");
                self.since_tick += 1;
                if self.since_tick >= self.computer.config().cycles_per_frame {
                    self.tick_devices();
                }
            }
            Err(e) => {
                self.status = format!("Error: {e}");
                self.running = false;
            }
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Stop continuous execution.
    pub fn pause(&mut self) {
        self.running = false;
        self.status = format!("Paused after {} cycles.", self.computer.cpu.cycles);
    }

    /// One iteration of continuous execution: up to a frame of
    /// instructions, stopping early at a breakpoint or fault.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        // Breakpoints are checked after each step, so resuming from one
        // always makes progress.
        for _ in 0..self.computer.config().cycles_per_frame.max(1) {
            self.step();
            if !self.running {
                return;
            }
            let pc = self.computer.registers().pc;
            if self.breakpoints.contains(&pc) {
                self.running = false;
                self.status = format!("Breakpoint at PC={pc:04x}");
                return;
            }
        }
    }

    fn tick_devices(&mut self) {
        self.since_tick = 0;
        if let Err(e) = self.computer.tick_devices() {
            self.status = format!("Device error: {e}");
            self.running = false;
        }
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.computer.registers().pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={pc:04x}");
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={pc:04x}");
        }
    }

    /// Reload the program and reset the CPU.
    pub fn reset(&mut self) {
        self.running = false;
        self.since_tick = 0;
        self.status = match self.computer.load_image(&self.program) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Reset failed: {e}"),
        };
    }

    /// Forward a typed character to the emulated keyboard.
    pub fn send_key(&mut self, code: Word) {
        match self.computer.key_down(code) {
            Ok(_) => {
                self.computer.key_up(code);
                self.status = format!("Key {code:#06x} sent");
            }
            Err(e) => self.status = format!("Error: {e}"),
        }
    }

    /// Scroll the memory view by `delta` rows.
    pub fn scroll_memory(&mut self, delta: isize) {
        let rows = self.computer.cpu.mem.capacity().div_ceil(WORDS_PER_ROW);
        self.mem_row = self
            .mem_row
            .saturating_add_signed(delta)
            .min(rows.saturating_sub(1));
    }

    /// Disassembly starting at PC: `(address, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Word, String, bool)> {
        let pc = self.computer.registers().pc;
        disassemble_at(&self.computer.cpu.mem, pc, lines)
            .into_iter()
            .map(|(addr, text)| (addr, text, addr == pc))
            .collect()
    }

    /// Memory rows for the view: `(row address, words)`.
    pub fn memory_rows(&self, rows: usize) -> Vec<(usize, Vec<Word>)> {
        (self.mem_row..)
            .take(rows)
            .map(|row| row * WORDS_PER_ROW)
            .take_while(|&addr| addr < self.computer.cpu.mem.capacity())
            .map(|addr| {
                let words = self.computer.cpu.mem.dump(addr, WORDS_PER_ROW);
                (addr, words.into_iter().map(|(_, w)| w).collect())
            })
            .collect()
    }

    fn window_at(&self, pc: Word) -> Vec<Word> {
        (0..3u16)
            .filter_map(|i| self.computer.cpu.mem.peek(usize::from(pc.wrapping_add(i))).ok())
            .collect()
    }
}

/// Run the debugger on a computer with `program` loaded.
pub fn run_debugger(computer: Computer, program: Vec<Word>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(computer, program);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.capture_keys {
                        match key.code {
                            KeyCode::Esc => {
                                app.capture_keys = false;
                                app.status = "Keyboard released.".into();
                            }
                            KeyCode::Enter => app.send_key(0x0A),
                            KeyCode::Backspace => app.send_key(0x08),
                            KeyCode::Char(c) if c.is_ascii() => app.send_key(c as Word),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => {
                                app.running = false;
                                app.step();
                            }
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('p') => app.pause(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Tab => {
                                app.capture_keys = true;
                                app.status = "Typing goes to the machine. Esc releases.".into();
                            }
                            KeyCode::Up => app.scroll_memory(-1),
                            KeyCode::Down => app.scroll_memory(1),
                            KeyCode::PageUp => app.scroll_memory(-16),
                            KeyCode::PageDown => app.scroll_memory(16),
                            _ => {}
                        }
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
