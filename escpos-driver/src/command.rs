//! ESC/POS command building
//!
//! A [`CommandSequence`] holds the ordered byte chunks of one logical
//! printer operation. The free functions below build the plain ESC/POS
//! commands that vendor command sets fall back to when they have no
//! override of their own.

use crate::error::{PrintError, PrintResult};

/// Ordered byte chunks of one printer operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSequence {
    chunks: Vec<Vec<u8>>,
}

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of exactly one chunk
    pub fn single(chunk: impl Into<Vec<u8>>) -> Self {
        let mut seq = Self::new();
        seq.push(chunk);
        seq
    }

    /// Append a chunk; empty chunks are dropped
    pub fn push(&mut self, chunk: impl Into<Vec<u8>>) -> &mut Self {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        self
    }

    /// Append every chunk of `other`
    pub fn append(&mut self, other: CommandSequence) -> &mut Self {
        self.chunks.extend(other.chunks);
        self
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total byte length
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate all chunks for a single contiguous write
    pub fn to_bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

impl From<Vec<u8>> for CommandSequence {
    fn from(chunk: Vec<u8>) -> Self {
        Self::single(chunk)
    }
}

/// Text justification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left = 0,
    Center = 1,
    Right = 2,
}

// === Plain ESC/POS ===

/// ESC @ - hardware reset
pub fn init() -> Vec<u8> {
    vec![0x1B, 0x40]
}

/// LF repeated `lines` times
pub fn line_feed(lines: usize) -> Vec<u8> {
    vec![0x0A; lines]
}

/// ESC a n
pub fn justify(j: Justify) -> Vec<u8> {
    vec![0x1B, 0x61, j as u8]
}

/// ESC E n
pub fn emphasized(on: bool) -> Vec<u8> {
    vec![0x1B, 0x45, on as u8]
}

/// ESC t n - select character code table
pub fn code_page(n: u8) -> Vec<u8> {
    vec![0x1B, 0x74, n]
}

/// GS ! n - character size, `width` and `height` are magnification steps 0..=7
pub fn text_size(width: u8, height: u8) -> PrintResult<Vec<u8>> {
    if width > 7 || height > 7 {
        return Err(PrintError::InvalidArgument(format!(
            "text size must be within 0..=7; got width={} height={}",
            width, height
        )));
    }
    Ok(vec![0x1D, 0x21, (width << 4) | height])
}

/// GS V m - partial (1) or full (0) cut
pub fn cut(partial: bool) -> Vec<u8> {
    vec![0x1D, 0x56, if partial { 0x01 } else { 0x00 }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_chunks() {
        let mut seq = CommandSequence::new();
        seq.push(init()).push(Vec::new()).push(b"abc".to_vec());
        assert_eq!(seq.chunks().len(), 2);
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.to_bytes(), b"\x1B\x40abc".to_vec());
    }

    #[test]
    fn test_append_keeps_order() {
        let mut a = CommandSequence::single(vec![1]);
        let mut b = CommandSequence::single(vec![2]);
        b.push(vec![3]);
        a.append(b);
        assert_eq!(a.to_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn test_plain_commands() {
        assert_eq!(justify(Justify::Center), vec![0x1B, 0x61, 0x01]);
        assert_eq!(justify(Justify::Right), vec![0x1B, 0x61, 0x02]);
        assert_eq!(emphasized(true), vec![0x1B, 0x45, 0x01]);
        assert_eq!(emphasized(false), vec![0x1B, 0x45, 0x00]);
        assert_eq!(code_page(255), vec![0x1B, 0x74, 0xFF]);
        assert_eq!(cut(true), vec![0x1D, 0x56, 0x01]);
        assert_eq!(cut(false), vec![0x1D, 0x56, 0x00]);
        assert_eq!(line_feed(3), vec![0x0A; 3]);
    }

    #[test]
    fn test_text_size() {
        assert_eq!(text_size(0, 0).unwrap(), vec![0x1D, 0x21, 0x00]);
        assert_eq!(text_size(1, 1).unwrap(), vec![0x1D, 0x21, 0x11]);
        assert_eq!(text_size(7, 2).unwrap(), vec![0x1D, 0x21, 0x72]);
        assert!(matches!(text_size(8, 0), Err(PrintError::InvalidArgument(_))));
        assert!(text_size(0, 8).is_err());
    }
}
