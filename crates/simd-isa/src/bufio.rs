//! Buffer data file IO.
//!
//! Buffer contents travel either as CSV of decimal numbers or as raw
//! little-endian 32-bit words. The format is picked from the file
//! extension: `.csv`/`.txt` mean CSV, anything else is binary.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::program::IsaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFileKind {
    DecimalCsv,
    Binary,
}

impl BufferFileKind {
    /// Format implied by the file name.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") | Some("txt") => BufferFileKind::DecimalCsv,
            _ => BufferFileKind::Binary,
        }
    }
}

/// Read a buffer data file into 32-bit words.
///
/// CSV cells containing a `.`, `e` exponent or `f` suffix parse as `f32`
/// and contribute their bit pattern; other cells parse as (possibly
/// negative) integers.
pub fn read_buffer_file(path: &Path) -> Result<Vec<u32>, IsaError> {
    let kind = BufferFileKind::from_path(path);
    let io_err = |e: std::io::Error| IsaError::Io { path: path.display().to_string(), msg: e.to_string() };

    match kind {
        BufferFileKind::Binary => {
            let bytes = fs::read(path).map_err(io_err)?;
            Ok(bytes
                .chunks(4)
                .map(|c| {
                    let mut w = [0u8; 4];
                    w[..c.len()].copy_from_slice(c);
                    u32::from_le_bytes(w)
                })
                .collect())
        }
        BufferFileKind::DecimalCsv => {
            let text = fs::read_to_string(path).map_err(io_err)?;
            let mut words = Vec::new();
            for cell in text.split(|c: char| c == ',' || c.is_whitespace()) {
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                words.push(parse_cell(cell).ok_or_else(|| IsaError::Io {
                    path: path.display().to_string(),
                    msg: format!("malformed CSV cell \"{cell}\""),
                })?);
            }
            Ok(words)
        }
    }
}

fn parse_cell(cell: &str) -> Option<u32> {
    let looks_float = cell.contains('.') || cell.contains(['e', 'E']) || cell.ends_with('f');
    if looks_float {
        let trimmed = cell.strip_suffix('f').unwrap_or(cell);
        if let Ok(f) = trimmed.parse::<f32>() {
            return Some(f.to_bits());
        }
    }
    if let Some(hex) = cell.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).ok();
    }
    cell.parse::<i64>().ok().map(|v| v as u32)
}

/// Write buffer words to a file in the format implied by its extension.
/// CSV output renders words as `f32` values, one per line, matching the
/// comparison semantics of the `-c`/`-e` options.
pub fn write_buffer_file(path: &Path, words: &[u32]) -> Result<(), IsaError> {
    let io_err = |e: std::io::Error| IsaError::Io { path: path.display().to_string(), msg: e.to_string() };

    match BufferFileKind::from_path(path) {
        BufferFileKind::Binary => {
            let mut bytes = Vec::with_capacity(words.len() * 4);
            for w in words {
                bytes.extend_from_slice(&w.to_le_bytes());
            }
            fs::write(path, bytes).map_err(io_err)
        }
        BufferFileKind::DecimalCsv => {
            let mut f = fs::File::create(path).map_err(io_err)?;
            for w in words {
                writeln!(f, "{}", f32::from_bits(*w)).map_err(io_err)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_cells() {
        assert_eq!(parse_cell("42"), Some(42));
        assert_eq!(parse_cell("-1"), Some(u32::MAX));
        assert_eq!(parse_cell("0x10"), Some(16));
        assert_eq!(parse_cell("1.5"), Some(1.5f32.to_bits()));
        assert_eq!(parse_cell("2.0f"), Some(2.0f32.to_bits()));
        assert_eq!(parse_cell("zzz"), None);
    }

    #[test]
    fn binary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf.bin");
        let words = vec![0xdeadbeef, 1, 2, 3];
        write_buffer_file(&path, &words).unwrap();
        assert_eq!(read_buffer_file(&path).unwrap(), words);
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buf.csv");
        let words: Vec<u32> = [1.0f32, -2.5, 0.125].iter().map(|f| f.to_bits()).collect();
        write_buffer_file(&path, &words).unwrap();
        assert_eq!(read_buffer_file(&path).unwrap(), words);
    }
}
