//! Disassembler.
//!
//! Converts machine words back to assembly text the assembler accepts.

use crate::cpu::decode::{decode, Instruction, Operand};
use crate::cpu::{Memory, Word};

/// Disassemble the instruction at the start of `words`.
///
/// Returns the text and the number of words consumed. A word that does not
/// decode, or whose operand words run past the end of `words`, comes out as
/// a `DAT`.
pub fn disassemble_instruction(words: &[Word]) -> (String, usize) {
    let Some(&first) = words.first() else {
        return (String::new(), 0);
    };
    match decode(first) {
        Ok(instr) if instr.size() <= words.len() => {
            (format_instruction(&instr, &words[1..instr.size()]), instr.size())
        }
        _ => (format!("DAT {first:#06x}"), 1),
    }
}

/// Disassemble a word buffer loaded at address 0, one line per instruction.
pub fn disassemble(words: &[Word]) -> String {
    let mut output = String::new();
    let mut addr = 0;
    while addr < words.len() {
        let (text, size) = disassemble_instruction(&words[addr..]);
        let raw: Vec<String> = words[addr..addr + size].iter().map(|w| format!("{w:04x}")).collect();
        output.push_str(&format!("{addr:04x}: {text:<24} ; {}\n", raw.join(" ")));
        addr += size;
    }
    output
}

/// Disassemble `count` instructions from memory starting at `addr`.
///
/// Memory is read with [`Memory::peek`] so device registers are not
/// disturbed. Returns `(address, text)` pairs.
pub fn disassemble_at(mem: &Memory, addr: Word, count: usize) -> Vec<(Word, String)> {
    let mut lines = Vec::with_capacity(count);
    let mut pc = addr;
    for _ in 0..count {
        let window: Vec<Word> = (0..3u16)
            .map_while(|i| mem.peek(usize::from(pc.wrapping_add(i))).ok())
            .collect();
        if window.is_empty() {
            break;
        }
        let (text, size) = disassemble_instruction(&window);
        lines.push((pc, text));
        pc = pc.wrapping_add(size as Word);
    }
    lines
}

/// Format a decoded instruction; `extra` holds its operand words, `a`'s first.
fn format_instruction(instr: &Instruction, extra: &[Word]) -> String {
    let mnemonic = instr.opcode.mnemonic();
    if mnemonic == "NOP" && instr.a.code() == 0 && instr.b.code() == 0 {
        return mnemonic.to_string();
    }

    let mut extra = extra.iter().copied();
    let a = format_operand(instr.a, true, &mut extra);
    let b = format_operand(instr.b, false, &mut extra);
    format!("{mnemonic} {a}, {b}")
}

fn format_operand(operand: Operand, is_a: bool, extra: &mut impl Iterator<Item = Word>) -> String {
    let mut next = || extra.next().unwrap_or(0);
    match operand {
        Operand::Register(r) => r.to_string(),
        Operand::Indirect(r) => format!("[{r}]"),
        Operand::IndirectOffset(r) => format!("[{r} + {:#06x}]", next()),
        Operand::Stack if is_a => "PUSH".to_string(),
        Operand::Stack => "POP".to_string(),
        Operand::Peek => "PEEK".to_string(),
        Operand::Pick => format!("[SP + {:#06x}]", next()),
        Operand::Sp => "SP".to_string(),
        Operand::Pc => "PC".to_string(),
        Operand::Ex => "EX".to_string(),
        Operand::IndirectNext => format!("[{:#06x}]", next()),
        Operand::NextLiteral => format!("{:#06x}", next()),
        Operand::Inline(v) => format!("{v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn test_disassemble_simple() {
        let words = assemble("SET A, 1").unwrap();
        assert_eq!(disassemble_instruction(&words), ("SET A, 1".to_string(), 1));
    }

    #[test]
    fn test_disassemble_extra_words() {
        let words = assemble("SET [I + 0x10], 0x1234").unwrap();
        let (text, size) = disassemble_instruction(&words);
        assert_eq!(text, "SET [I + 0x0010], 0x1234");
        assert_eq!(size, 3);
    }

    #[test]
    fn test_stack_operands() {
        let words = assemble("SET PUSH, POP\nSET PEEK, [SP + 2]").unwrap();
        let listing = disassemble(&words);
        assert!(listing.contains("SET PUSH, POP"));
        assert!(listing.contains("SET PEEK, [SP + 0x0002]"));
    }

    #[test]
    fn test_bad_words_become_data() {
        // Opcode 0x07 does not decode; a truncated SET with a next-word operand.
        assert_eq!(disassemble_instruction(&[0x0007]), ("DAT 0x0007".to_string(), 1));
        assert_eq!(disassemble_instruction(&[0x7C01]), ("DAT 0x7c01".to_string(), 1));
    }

    #[test]
    fn test_reassembles() {
        let source = "SET A, 0x30\nADD [B + 2], 7\nSUB X, [0x1000]\nSHL EX, PC\nNOP";
        let words = assemble(source).unwrap();
        let text: Vec<String> = {
            let mut out = Vec::new();
            let mut at = 0;
            while at < words.len() {
                let (line, size) = disassemble_instruction(&words[at..]);
                out.push(line);
                at += size;
            }
            out
        };
        assert_eq!(assemble(&text.join("\n")).unwrap(), words);
    }

    #[test]
    fn test_disassemble_at_memory() {
        let mut mem = Memory::new();
        mem.load(0x100, &assemble("SET A, 0x40\nADD A, 1").unwrap()).unwrap();
        let lines = disassemble_at(&mem, 0x100, 2);
        assert_eq!(lines[0], (0x100, "SET A, 0x0040".to_string()));
        assert_eq!(lines[1], (0x102, "ADD A, 1".to_string()));
    }
}
