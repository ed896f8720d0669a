//! Program image file format.
//!
//! A plain text format:
//! - One 16-bit word per line, as 4 hex digits (an optional `0x` prefix is
//!   accepted)
//! - Anything after `;` is a comment
//! - Blank lines are ignored

use crate::cpu::Word;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// Parse image text into words.
pub fn parse_image(text: &str) -> Result<Vec<Word>, ImageError> {
    let mut words = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let data = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }

        let digits = data
            .strip_prefix("0x")
            .or_else(|| data.strip_prefix("0X"))
            .unwrap_or(data);
        if digits.is_empty() || digits.len() > 4 {
            return Err(ImageError::Parse {
                line: line_num + 1,
                message: format!("expected up to 4 hex digits, found '{data}'"),
            });
        }
        let word = Word::from_str_radix(digits, 16).map_err(|e| ImageError::Parse {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        words.push(word);
    }

    Ok(words)
}

/// Render words as image text, annotating each line with its address.
pub fn format_image(words: &[Word]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; dcpu program image");
    let _ = writeln!(out, "; {} words", words.len());
    let _ = writeln!(out);
    for (addr, word) in words.iter().enumerate() {
        let _ = writeln!(out, "{word:04x} ; {addr:04x}");
    }
    out
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, ImageError> {
    let text = std::fs::read_to_string(path.as_ref()).map_err(|e| ImageError::Io(e.to_string()))?;
    parse_image(&text)
}

/// Save words to an image file.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), ImageError> {
    std::fs::write(path.as_ref(), format_image(words)).map_err(|e| ImageError::Io(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}
