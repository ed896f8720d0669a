//! Two-pass assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//! :loop               ; Define a label at the current address
//!     SET A, 0x30     ; Register, literal
//!     ADD [B + 2], 1  ; Indirect with offset, inline literal
//!     SET PUSH, A     ; Stack push (POP when used as a source)
//!     SET PC, loop    ; Jump to label
//!     DAT 1, 2, loop  ; Raw words
//! ```
//!
//! Pass 1 parses every line and assigns addresses to labels. Pass 2 emits
//! words, leaving a placeholder for every label operand, and the placeholders
//! are back-patched once the whole program has been emitted.

use crate::cpu::decode::{opcode_for, INLINE_LITERAL_MAX};
use crate::cpu::{Register, Word, MEMORY_SIZE};
use indexmap::IndexMap;
use thiserror::Error;

/// Assemble source code to a word buffer loadable at address 0.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssemblerError> {
    assemble_program(source).map(|program| program.words)
}

/// Assemble source code, keeping the label table.
pub fn assemble_program(source: &str) -> Result<Program, AssemblerError> {
    Assembler::default().assemble(source)
}

/// Output of a successful assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Machine words, to be loaded at address 0.
    pub words: Vec<Word>,
    /// Label addresses, in definition order.
    pub labels: IndexMap<String, Word>,
}

/// A value that fills an extra operand word or a `DAT` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Number(Word),
    Label(String),
}

/// One assembled operand: its 6-bit code and optional extra word.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    code: u8,
    extra: Option<Value>,
}

impl Arg {
    fn code(code: u8) -> Self {
        Self { code, extra: None }
    }

    fn with_extra(code: u8, value: Value) -> Self {
        Self {
            code,
            extra: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Label(String),
    Instruction { opcode: u8, a: Arg, b: Arg },
    Data(Vec<Value>),
}

impl Statement {
    fn size(&self) -> usize {
        match self {
            Statement::Label(_) => 0,
            Statement::Instruction { a, b, .. } => {
                1 + usize::from(a.extra.is_some()) + usize::from(b.extra.is_some())
            }
            Statement::Data(values) => values.len(),
        }
    }
}

#[derive(Default)]
struct Assembler {
    /// Label -> address. Later definitions replace earlier ones.
    labels: IndexMap<String, Word>,
    /// Placeholders awaiting a label address: (output index, label, line).
    references: Vec<(usize, String, usize)>,
    output: Vec<Word>,
}

impl Assembler {
    fn assemble(mut self, source: &str) -> Result<Program, AssemblerError> {
        // Pass 1: parse and lay out
        let mut statements = Vec::new();
        let mut addr = 0usize;
        for (index, line) in source.lines().enumerate() {
            let line_num = index + 1;
            let Some(statement) = parse_line(line, line_num)? else {
                continue;
            };
            if let Statement::Label(name) = &statement {
                let at = Word::try_from(addr).map_err(|_| AssemblerError::ValueOutOfRange {
                    line: line_num,
                    value: addr as i64,
                })?;
                self.labels.insert(name.clone(), at);
            }
            addr += statement.size();
            statements.push((line_num, statement));
        }
        if addr > MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { size: addr });
        }

        // Pass 2: emit
        for (line_num, statement) in statements {
            match statement {
                Statement::Label(_) => {}
                Statement::Instruction { opcode, a, b } => {
                    self.output.push(
                        Word::from(opcode) | (Word::from(a.code) << 4) | (Word::from(b.code) << 10),
                    );
                    for value in [a.extra, b.extra].into_iter().flatten() {
                        self.emit_value(value, line_num);
                    }
                }
                Statement::Data(values) => {
                    for value in values {
                        self.emit_value(value, line_num);
                    }
                }
            }
        }

        self.resolve_references()?;

        tracing::debug!(
            words = self.output.len(),
            labels = self.labels.len(),
            "assembled program"
        );
        Ok(Program {
            words: self.output,
            labels: self.labels,
        })
    }

    fn emit_value(&mut self, value: Value, line_num: usize) {
        match value {
            Value::Number(n) => self.output.push(n),
            Value::Label(label) => {
                self.references.push((self.output.len(), label, line_num));
                self.output.push(0);
            }
        }
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (index, label, line_num) in &self.references {
            let addr = self
                .labels
                .get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;
            self.output[*index] = *addr;
        }
        Ok(())
    }
}

/// Parse one source line. Blank and comment-only lines give `None`.
fn parse_line(line: &str, line_num: usize) -> Result<Option<Statement>, AssemblerError> {
    let line = match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = line.strip_prefix(':') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        if !is_label_name(name) {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid label name '{name}'"),
            });
        }
        if is_reserved_name(name) {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("'{name}' is a register or operand keyword and cannot be a label"),
            });
        }
        if let Some(trailing) = parts.next().map(str::trim).filter(|t| !t.is_empty()) {
            tracing::warn!(line = line_num, label = name, trailing, "text after label definition ignored");
        }
        return Ok(Some(Statement::Label(name.to_string())));
    }

    let (mnemonic, operands) = match line.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (line, ""),
    };
    let mnemonic = mnemonic.to_ascii_uppercase();

    match mnemonic.as_str() {
        "DAT" => {
            if operands.is_empty() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "DAT requires at least one value".into(),
                });
            }
            let values = operands
                .split(',')
                .map(|v| parse_value(v.trim(), line_num))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Statement::Data(values)))
        }

        "NOP" => {
            if !operands.is_empty() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "NOP takes no operands".into(),
                });
            }
            Ok(Some(Statement::Instruction {
                opcode: 0,
                a: Arg::code(0),
                b: Arg::code(0),
            }))
        }

        _ => {
            let opcode = opcode_for(&mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.clone(),
            })?;
            if opcode > 0x0F {
                return Err(AssemblerError::UnsupportedOpcode {
                    line: line_num,
                    mnemonic,
                    value: opcode,
                });
            }

            let parts: Vec<&str> = operands.split(',').map(str::trim).collect();
            let [a, b] = parts.as_slice() else {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("{mnemonic} takes two operands"),
                });
            };
            Ok(Some(Statement::Instruction {
                opcode,
                a: parse_operand(a, line_num)?,
                b: parse_operand(b, line_num)?,
            }))
        }
    }
}

/// Parse one operand into its encoding.
fn parse_operand(text: &str, line_num: usize) -> Result<Arg, AssemblerError> {
    if text.is_empty() {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: "missing operand".into(),
        });
    }

    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("unclosed bracket in '{text}'"),
        })?;
        return parse_indirect(inner.trim(), line_num);
    }

    let upper = text.to_ascii_uppercase();
    if let Some(reg) = Register::parse(&upper) {
        return Ok(Arg::code(reg.index()));
    }
    match upper.as_str() {
        "PUSH" | "POP" => return Ok(Arg::code(0x18)),
        "PEEK" => return Ok(Arg::code(0x19)),
        "SP" => return Ok(Arg::code(0x1B)),
        "PC" => return Ok(Arg::code(0x1C)),
        "EX" => return Ok(Arg::code(0x1D)),
        _ => {}
    }
    if let Some(offset) = upper.strip_prefix("PICK ") {
        let offset_text = &text[text.len() - offset.len()..];
        return Ok(Arg::with_extra(0x1A, parse_value(offset_text.trim(), line_num)?));
    }

    match parse_value(text, line_num)? {
        Value::Number(n) if n <= INLINE_LITERAL_MAX => Ok(Arg::code(0x20 + n as u8)),
        value => Ok(Arg::with_extra(0x1F, value)),
    }
}

/// Parse the inside of `[...]`.
fn parse_indirect(inner: &str, line_num: usize) -> Result<Arg, AssemblerError> {
    let terms: Vec<&str> = inner.split('+').map(str::trim).collect();
    match terms.as_slice() {
        [single] => {
            if let Some(reg) = Register::parse(single) {
                Ok(Arg::code(0x08 + reg.index()))
            } else if single.eq_ignore_ascii_case("SP") {
                Ok(Arg::code(0x19))
            } else {
                Ok(Arg::with_extra(0x1E, parse_value(single, line_num)?))
            }
        }
        [left, right] => {
            let (base, offset) = if is_base(left) { (left, right) } else { (right, left) };
            if is_base(offset) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("'[{inner}]' adds two registers"),
                });
            }
            let offset = parse_value(offset, line_num)?;
            if let Some(reg) = Register::parse(base) {
                Ok(Arg::with_extra(0x10 + reg.index(), offset))
            } else if base.eq_ignore_ascii_case("SP") {
                Ok(Arg::with_extra(0x1A, offset))
            } else {
                Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("'[{inner}]' needs a register"),
                })
            }
        }
        _ => Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("bad indirect operand '[{inner}]'"),
        }),
    }
}

fn is_base(term: &str) -> bool {
    Register::parse(term).is_some() || term.eq_ignore_ascii_case("SP")
}

/// Parse a number (hex, binary, decimal, optionally negative) or a label.
fn parse_value(text: &str, line_num: usize) -> Result<Value, AssemblerError> {
    if text.is_empty() {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: "missing value".into(),
        });
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };

    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(i64::from_str_radix(hex, 16))
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        Some(i64::from_str_radix(bin, 2))
    } else if digits.starts_with(|c: char| c.is_ascii_digit()) {
        Some(digits.parse::<i64>())
    } else {
        None
    };

    match parsed {
        Some(Ok(n)) => {
            let value = if negative { -n } else { n };
            if !(-0x8000..=0xFFFF).contains(&value) {
                return Err(AssemblerError::ValueOutOfRange { line: line_num, value });
            }
            Ok(Value::Number((value & 0xFFFF) as Word))
        }
        Some(Err(_)) => Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid number '{text}'"),
        }),
        None if !negative && is_label_name(text) => Ok(Value::Label(text.to_string())),
        None => Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid operand '{text}'"),
        }),
    }
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Names the operand parser claims before it considers labels.
fn is_reserved_name(name: &str) -> bool {
    Register::parse(name).is_some()
        || ["SP", "PC", "EX", "PUSH", "POP", "PEEK", "PICK"]
            .iter()
            .any(|kw| name.eq_ignore_ascii_case(kw))
}

/// Errors that can occur during assembly. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("unsupported opcode on line {line}: {mnemonic} ({value:#04x}) does not fit the 4-bit opcode field")]
    UnsupportedOpcode { line: usize, mnemonic: String, value: u8 },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program of {size} words does not fit in memory")]
    ProgramTooLarge { size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{self, fields, Opcode, Operand};
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_label_line_round_trip() {
        let words = assemble(":loop SET A, 1\nADD A, 1\nSET PC, loop").unwrap();

        assert_eq!(words, vec![0x8402, 0x7DC1, 0x0000]);
        assert!(logs_contain("text after label definition ignored"));
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Simple test program
            SET A, 0x30
            SET [0x1000], 0x20
            SUB A, [0x1000]
        "#;

        let words = assemble(source).unwrap();
        assert_eq!(words.len(), 7);
        assert_eq!(words[1], 0x30);
        assert_eq!(&words[3..5], &[0x1000, 0x20]);
        assert_eq!(words[6], 0x1000);
    }

    #[test]
    fn test_backward_and_forward_labels() {
        let source = "
            SET PC, end
        :loop
            ADD A, 1
            SET PC, loop
        :end
            SET B, A
        ";

        let program = assemble_program(source).unwrap();
        assert_eq!(program.labels["loop"], 2);
        assert_eq!(program.labels["end"], 5);
        assert_eq!(program.words[1], 5);
        assert_eq!(program.words[4], 2);
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        assert!(matches!(
            assemble(":Top\nSET PC, top"),
            Err(AssemblerError::UndefinedLabel { line: 2, .. })
        ));
    }

    #[test]
    fn test_encoding_fields_match_operands() {
        let cases: &[(&str, u8, u8, u8)] = &[
            ("SET A, 1", 0x01, 0x00, 0x21),
            ("add b, c", 0x02, 0x01, 0x02),
            ("SUB [I], [J]", 0x03, 0x0E, 0x0F),
            ("MUL [X + 4], 0", 0x04, 0x13, 0x20),
            ("MLI [4 + Y], 0x1F", 0x05, 0x14, 0x3F),
            ("DIV PUSH, POP", 0x06, 0x18, 0x18),
            ("AND PEEK, [SP]", 0x0A, 0x19, 0x19),
            ("BOR [SP + 1], PICK 2", 0x0B, 0x1A, 0x1A),
            ("XOR SP, PC", 0x0C, 0x1B, 0x1C),
            ("SHR EX, [0x8000]", 0x0D, 0x1D, 0x1E),
            ("ASR Z, 0x20", 0x0E, 0x05, 0x1F),
            ("SHL J, 5", 0x0F, 0x07, 0x25),
        ];

        for &(source, op, a, b) in cases {
            let words = assemble(source).unwrap();
            assert_eq!(fields(words[0]), (op, a, b), "{source}");
        }
    }

    #[test]
    fn test_extra_words_follow_in_operand_order() {
        let words = assemble("SET [A + 0x10], 0x1234").unwrap();
        assert_eq!(words, vec![words[0], 0x10, 0x1234]);

        let instr = decode::decode(words[0]).unwrap();
        assert_eq!(instr.opcode, Opcode::Set);
        assert_eq!(instr.a, Operand::IndirectOffset(Register::A));
        assert_eq!(instr.b, Operand::NextLiteral);
    }

    #[test]
    fn test_literal_packing() {
        assert_eq!(assemble("SET A, 31").unwrap().len(), 1);
        assert_eq!(assemble("SET A, 32").unwrap(), vec![0x7C01, 32]);
        assert_eq!(assemble("SET A, 0b101").unwrap(), vec![0x01 | (0x25 << 10)]);
        assert_eq!(assemble("SET A, -1").unwrap()[1], 0xFFFF);
    }

    #[test]
    fn test_literal_destination_assembles() {
        // Rejected at run time, not here.
        let words = assemble("SET 5, A").unwrap();
        assert_eq!(fields(words[0]), (0x01, 0x25, 0x00));
    }

    #[test]
    fn test_data_directive() {
        let words = assemble(":start\nDAT 42, -17, 0x1234, start").unwrap();
        assert_eq!(words, vec![42, 0xFFEF, 0x1234, 0]);
    }

    #[test]
    fn test_nop() {
        assert_eq!(assemble("nop").unwrap(), vec![0]);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let words = assemble("\n  ; only a comment\n\nSET A, 1 ; trailing\n").unwrap();
        assert_eq!(words, vec![0x8401]);
    }

    #[test]
    fn test_undefined_label() {
        let err = assemble("SET A, 1\nSET PC, nowhere").unwrap_err();
        assert_eq!(
            err,
            AssemblerError::UndefinedLabel {
                line: 2,
                label: "nowhere".into()
            }
        );
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(
            assemble("\nJSR A, 1"),
            Err(AssemblerError::UnknownMnemonic {
                line: 2,
                mnemonic: "JSR".into()
            })
        );
    }

    #[test]
    fn test_high_opcodes_rejected() {
        for mnemonic in ["IFE", "IFU", "ADX", "STD"] {
            let err = assemble(&format!("{mnemonic} A, 1")).unwrap_err();
            assert!(
                matches!(err, AssemblerError::UnsupportedOpcode { line: 1, .. }),
                "{mnemonic}: {err}"
            );
        }
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["SET A", "SET A, 1, 2", "SET [A, 1", "SET [A + B], 1", "SET A, 0xZZ", ":", "DAT"] {
            assert!(
                matches!(assemble(source), Err(AssemblerError::SyntaxError { .. })),
                "{source}"
            );
        }
    }

    #[test]
    fn test_value_out_of_range() {
        assert_eq!(
            assemble("SET A, 70000"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: 70000 })
        );
    }

    #[test]
    fn test_reserved_names_rejected_as_labels() {
        for name in ["x", "J", "push", "POP", "peek", "Pick", "sp", "pc", "ex"] {
            let source = format!("SET A, 1\n:{name}\nSET PC, {name}");
            assert!(
                matches!(assemble(&source), Err(AssemblerError::SyntaxError { line: 2, .. })),
                "{name}"
            );
        }
        // Names that merely start with a keyword are ordinary labels.
        assert_eq!(assemble(":pcx\nSET PC, pcx"), Ok(vec![0x7DC1, 0x0000]));
    }
}
