//! ASCII control character mnemonics (0x00 - 0x1F)

use crate::error::{PrintError, PrintResult};

pub const NUL: u8 = 0;
pub const SOH: u8 = 1;
pub const STX: u8 = 2;
pub const ETX: u8 = 3;
pub const EOT: u8 = 4;
pub const ENQ: u8 = 5;
pub const ACK: u8 = 6;
pub const BEL: u8 = 7;
pub const BS: u8 = 8;
pub const HT: u8 = 9;
pub const LF: u8 = 10;
pub const VT: u8 = 11;
pub const FF: u8 = 12;
pub const CR: u8 = 13;
pub const SO: u8 = 14;
pub const SI: u8 = 15;
pub const DLE: u8 = 16;
pub const DC1: u8 = 17;
pub const DC2: u8 = 18;
pub const DC3: u8 = 19;
pub const DC4: u8 = 20;
pub const NAK: u8 = 21;
pub const SYN: u8 = 22;
pub const ETB: u8 = 23;
pub const CAN: u8 = 24;
pub const EM: u8 = 25;
pub const SUB: u8 = 26;
pub const ESC: u8 = 27;
pub const FS: u8 = 28;
pub const GS: u8 = 29;
pub const RS: u8 = 30;
pub const US: u8 = 31;

const MNEMONICS: [&str; 32] = [
    "NUL", "SOH", "STX", "ETX", "EOT", "ENQ", "ACK", "BEL", "BS", "HT", "LF", "VT", "FF", "CR",
    "SO", "SI", "DLE", "DC1", "DC2", "DC3", "DC4", "NAK", "SYN", "ETB", "CAN", "EM", "SUB", "ESC",
    "FS", "GS", "RS", "US",
];

/// Mnemonic for `n` when it is a control character, `None` otherwise.
pub fn mnemonic(n: u32) -> Option<&'static str> {
    MNEMONICS.get(n as usize).copied()
}

/// Reverse lookup, case insensitive (`"esc"` -> 27).
pub fn value(name: &str) -> PrintResult<u8> {
    MNEMONICS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
        .ok_or_else(|| {
            PrintError::InvalidArgument(format!("unknown ASCII mnemonic: {:?}", name))
        })
}
