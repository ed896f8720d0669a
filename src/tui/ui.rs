//! UI rendering for the debugger.

use super::app::{DebuggerApp, WORDS_PER_ROW};
use crate::cpu::Register;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, devices and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(5),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_devices(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly from PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{prefix}{addr:04x}: {instr}");

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{bp} {text}")).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw the register file.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = app.computer.registers();
    let gp_line = |names: &[Register]| {
        let mut spans = Vec::new();
        for &r in names {
            spans.push(Span::raw(format!("{r}: ")));
            spans.push(Span::styled(
                format!("{:04x}   ", regs.get(r)),
                Style::default().fg(Color::White),
            ));
        }
        Line::from(spans)
    };

    let content = vec![
        gp_line(&Register::ALL[..4]),
        gp_line(&Register::ALL[4..]),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:04x}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("   SP: "),
            Span::styled(format!("{:04x}", regs.sp), Style::default().fg(Color::White)),
            Span::raw("   EX: "),
            Span::styled(
                format!("{:04x}", regs.ex),
                if regs.ex != 0 {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::Gray)
                },
            ),
            Span::raw("   IA: "),
            Span::styled(format!("{:04x}", regs.ia), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.computer.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            if app.running {
                Span::styled("running", Style::default().fg(Color::Green))
            } else {
                Span::styled("stopped", Style::default().fg(Color::Red))
            },
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw memory view, eight words per row.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let pc = usize::from(app.computer.registers().pc);
    let sp = usize::from(app.computer.registers().sp);

    let items: Vec<ListItem> = app
        .memory_rows(visible_rows)
        .into_iter()
        .map(|(addr, words)| {
            let mut spans = vec![Span::styled(
                format!("{addr:04x}: "),
                Style::default().fg(Color::DarkGray),
            )];
            for (i, w) in words.iter().enumerate() {
                let at = addr + i;
                let style = if at == pc {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else if at == sp {
                    Style::default().fg(Color::Magenta)
                } else if *w != 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                spans.push(Span::styled(format!("{w:04x} "), style));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Memory ({WORDS_PER_ROW} words/row) "))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw device state.
fn draw_devices(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let clock = app.computer.clock();
    let keyboard = app.computer.keyboard();
    let display = app.computer.display();

    let content = vec![
        Line::from(format!("Clock: {} Hz, {} ticks", clock.rate_hz(), clock.ticks())),
        Line::from(format!(
            "Keyboard: {} pending{}",
            keyboard.pending(),
            if app.capture_keys { " (capturing)" } else { "" }
        )),
        Line::from(format!(
            "Display: vram {:04x}  border {:x}{}",
            display.vram_base(),
            display.border(),
            if display.is_dirty() { "  dirty" } else { "" }
        )),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Devices ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  x: Reset"),
        Line::from("Tab: Type into machine (Esc releases)"),
        Line::from("↑↓ PgUp PgDn: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
