//! Hex dump formatting for transport debug logs

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;
const HEX_PANEL_WIDTH: usize = BYTES_PER_LINE * 3 - 1;

/// Format `data` as classic hex dump lines.
///
/// ```text
/// 1b 40 48 65 6c 6c 6f 0a                           .@Hello.
/// ```
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 8);
    for (n, line) in data.chunks(BYTES_PER_LINE).enumerate() {
        if n > 0 {
            out.push('\n');
        }
        let hex = line
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = write!(
            out,
            "{:<hw$}  {:<aw$}",
            hex,
            ascii,
            hw = HEX_PANEL_WIDTH,
            aw = BYTES_PER_LINE
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let dump = hexdump(b"\x1b@Hello\n");
        assert_eq!(
            dump,
            format!("{:<47}  {:<16}", "1b 40 48 65 6c 6c 6f 0a", ".@Hello.")
        );
    }

    #[test]
    fn test_multi_line() {
        let data: Vec<u8> = (0x30..0x50).collect();
        let dump = hexdump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("30 31 32"));
        assert!(lines[0].ends_with("0123456789:;<=>?"));
        assert!(lines[1].ends_with("@ABCDEFGHIJKLMNO"));
        assert_eq!(lines[0].len(), 47 + 2 + 16);
    }

    #[test]
    fn test_empty() {
        assert_eq!(hexdump(&[]), "");
    }
}
