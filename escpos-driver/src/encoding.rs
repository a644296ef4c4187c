//! Text encoding utilities
//!
//! Printers take text as bytes in whatever code page the device is set to.
//! These helpers encode with an `encoding_rs` encoding and measure strings
//! by their encoded width, which is what the printer counts as columns for
//! single-byte and double-byte code pages alike.

use encoding_rs::{EncoderResult, Encoding};
use tracing::instrument;

use crate::error::{PrintError, PrintResult};

/// What to do with characters the target encoding cannot represent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodingErrors {
    /// Fail with [`PrintError::Encoding`]
    #[default]
    Strict,
    /// Emit `?` in place of each unmappable character
    Replace,
}

/// Encode `text`, honouring `errors` for unmappable characters
#[instrument(level = "trace", skip(text, encoding), fields(encoding = encoding.name()))]
pub fn encode_text(
    text: &str,
    encoding: &'static Encoding,
    errors: EncodingErrors,
) -> PrintResult<Vec<u8>> {
    let mut encoder = encoding.new_encoder();
    let capacity = encoder
        .max_buffer_length_from_utf8_without_replacement(text.len())
        .unwrap_or(text.len() * 4);
    let mut out = Vec::with_capacity(capacity);
    let mut src = text;

    loop {
        let (result, read) =
            encoder.encode_from_utf8_to_vec_without_replacement(src, &mut out, true);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => return Ok(out),
            EncoderResult::OutputFull => out.reserve(src.len().max(16) * 4),
            EncoderResult::Unmappable(c) => match errors {
                EncodingErrors::Strict => {
                    return Err(PrintError::Encoding(format!(
                        "{:?} cannot be encoded as {}",
                        c,
                        encoding.name()
                    )));
                }
                EncodingErrors::Replace => out.push(b'?'),
            },
        }
    }
}

fn char_width(c: char, encoding: &'static Encoding) -> usize {
    let mut buf = [0u8; 4];
    let s = c.encode_utf8(&mut buf);
    encode_text(s, encoding, EncodingErrors::Replace)
        .map(|b| b.len())
        .unwrap_or(1)
}

/// Number of bytes `s` occupies once encoded (unmappable characters count as one)
pub fn encoded_width(s: &str, encoding: &'static Encoding) -> usize {
    s.chars().map(|c| char_width(c, encoding)).sum()
}

/// Truncate a string to fit within an encoded byte width
pub fn truncate_to_width(s: &str, max_width: usize, encoding: &'static Encoding) -> String {
    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let w = char_width(c, encoding);
        if width + w > max_width {
            break;
        }
        result.push(c);
        width += w;
    }
    result
}

/// Pad a string with spaces to an encoded byte width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad_to_width(
    s: &str,
    width: usize,
    align_right: bool,
    encoding: &'static Encoding,
) -> String {
    let current_width = encoded_width(s, encoding);
    if current_width >= width {
        return truncate_to_width(s, width, encoding);
    }
    let spaces = width - current_width;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{GBK, UTF_8, WINDOWS_1252};

    #[test]
    fn test_encoded_width() {
        assert_eq!(encoded_width("hello", GBK), 5);
        assert_eq!(encoded_width("你好", GBK), 4);
        assert_eq!(encoded_width("AB中文CD", GBK), 8);
        assert_eq!(encoded_width("ação", WINDOWS_1252), 4);
        assert_eq!(encoded_width("ação", UTF_8), 6);
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("hello world", 5, GBK), "hello");
        assert_eq!(truncate_to_width("你好世界", 4, GBK), "你好");
        assert_eq!(truncate_to_width("AB中文", 4, GBK), "AB中");
        assert_eq!(truncate_to_width("AB中文", 3, GBK), "AB");
    }

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width("hi", 5, false, UTF_8), "hi   ");
        assert_eq!(pad_to_width("hi", 5, true, UTF_8), "   hi");
        assert_eq!(pad_to_width("hello world", 5, false, UTF_8), "hello");
    }

    #[test]
    fn test_encode_strict_and_replace() {
        assert_eq!(
            encode_text("café", WINDOWS_1252, EncodingErrors::Strict).unwrap(),
            b"caf\xE9".to_vec()
        );
        assert!(matches!(
            encode_text("中", WINDOWS_1252, EncodingErrors::Strict),
            Err(PrintError::Encoding(_))
        ));
        assert_eq!(
            encode_text("a中b", WINDOWS_1252, EncodingErrors::Replace).unwrap(),
            b"a?b".to_vec()
        );
    }
}
