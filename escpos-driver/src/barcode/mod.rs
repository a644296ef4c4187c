//! Barcode and QR code encoders
//!
//! Options are normalized, device independent values. Each encoder
//! translates them into its own parameter bytes.
//!
//! Options can also be built from `name=value` keyword pairs, checked
//! against a closed set of names:
//!
//! | name                 | values                           |
//! |----------------------|----------------------------------|
//! | `barcode_height`     | 1..=255                          |
//! | `barcode_width`      | `normal`, `double`, `quadruple`  |
//! | `barcode_hri`        | `none`, `top`, `bottom`, `both`  |
//! | `qrcode_module_size` | 4..=8                            |
//! | `qrcode_ecc_level`   | `L`, `M`, `Q`, `H`               |

use std::fmt;
use std::num::NonZeroU8;
use std::str::FromStr;
use std::time::Duration;

use crate::command::CommandSequence;
use crate::error::{PrintError, PrintResult};

mod payload;
mod qrcode;
mod symbology;
pub mod vendor;

pub use payload::{Code128, Ean8, Ean13};
pub use qrcode::encode_qrcode;
pub use symbology::{Symbology, encode_barcode};

/// Time a barcode needs to come out of the printer before its response is read
pub const BARCODE_SETTLE: Duration = Duration::from_millis(250);

/// Bar module width
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarcodeWidth {
    #[default]
    Normal,
    Double,
    Quadruple,
}

impl BarcodeWidth {
    /// ESC/POS `GS w` parameter
    pub fn code(self) -> u8 {
        match self {
            BarcodeWidth::Normal => 2,
            BarcodeWidth::Double => 3,
            BarcodeWidth::Quadruple => 4,
        }
    }
}

impl FromStr for BarcodeWidth {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(BarcodeWidth::Normal),
            "double" => Ok(BarcodeWidth::Double),
            "quadruple" => Ok(BarcodeWidth::Quadruple),
            _ => Err(()),
        }
    }
}

/// Human readable interpretation placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarcodeHri {
    #[default]
    None,
    Top,
    Bottom,
    Both,
}

impl BarcodeHri {
    /// ESC/POS `GS H` parameter
    pub fn code(self) -> u8 {
        match self {
            BarcodeHri::None => 0,
            BarcodeHri::Top => 1,
            BarcodeHri::Bottom => 2,
            BarcodeHri::Both => 3,
        }
    }
}

impl FromStr for BarcodeHri {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BarcodeHri::None),
            "top" => Ok(BarcodeHri::Top),
            "bottom" => Ok(BarcodeHri::Bottom),
            "both" => Ok(BarcodeHri::Both),
            _ => Err(()),
        }
    }
}

/// QR error correction level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QrEccLevel {
    /// ~7%
    #[default]
    L,
    /// ~15%
    M,
    /// ~25%
    Q,
    /// ~30%
    H,
}

impl QrEccLevel {
    /// `GS ( k` function 169 parameter
    pub fn code(self) -> u8 {
        match self {
            QrEccLevel::L => 0x30,
            QrEccLevel::M => 0x31,
            QrEccLevel::Q => 0x32,
            QrEccLevel::H => 0x33,
        }
    }
}

impl FromStr for QrEccLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" | "l" => Ok(QrEccLevel::L),
            "M" | "m" => Ok(QrEccLevel::M),
            "Q" | "q" => Ok(QrEccLevel::Q),
            "H" | "h" => Ok(QrEccLevel::H),
            _ => Err(()),
        }
    }
}

/// QR module size in dots (4..=8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QrModuleSize(u8);

impl QrModuleSize {
    pub const MIN: QrModuleSize = QrModuleSize(4);
    pub const MAX: QrModuleSize = QrModuleSize(8);

    pub fn new(dots: u8) -> Option<Self> {
        (4..=8).contains(&dots).then_some(Self(dots))
    }

    pub fn dots(self) -> u8 {
        self.0
    }
}

impl Default for QrModuleSize {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for QrModuleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-dot", self.0)
    }
}

/// 1D barcode options; unset fields emit no configuration command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarcodeOptions {
    pub height: Option<NonZeroU8>,
    pub width: Option<BarcodeWidth>,
    pub hri: Option<BarcodeHri>,
}

/// QR code options; unset fields take each encoder's own default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QrCodeOptions {
    pub module_size: Option<QrModuleSize>,
    pub ecc_level: Option<QrEccLevel>,
}

fn invalid_value(name: &str, value: &str) -> PrintError {
    PrintError::InvalidKeywordValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

impl BarcodeOptions {
    pub fn height(mut self, height: u8) -> PrintResult<Self> {
        self.height =
            Some(NonZeroU8::new(height).ok_or_else(|| invalid_value("barcode_height", "0"))?);
        Ok(self)
    }

    pub fn width(mut self, width: BarcodeWidth) -> Self {
        self.width = Some(width);
        self
    }

    pub fn hri(mut self, hri: BarcodeHri) -> Self {
        self.hri = Some(hri);
        self
    }

    /// Build options from keyword pairs such as `("barcode_height", "90")`
    pub fn from_keywords<'a>(
        keywords: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> PrintResult<Self> {
        let mut options = Self::default();
        for (name, value) in keywords {
            match name {
                "barcode_height" => {
                    let height = value
                        .trim()
                        .parse::<u8>()
                        .ok()
                        .and_then(NonZeroU8::new)
                        .ok_or_else(|| invalid_value(name, value))?;
                    options.height = Some(height);
                }
                "barcode_width" => {
                    options.width = Some(value.parse().map_err(|_| invalid_value(name, value))?);
                }
                "barcode_hri" => {
                    options.hri = Some(value.parse().map_err(|_| invalid_value(name, value))?);
                }
                _ => return Err(PrintError::UnexpectedKeyword(name.to_string())),
            }
        }
        Ok(options)
    }

    /// `GS h`, `GS w` and `GS H` for the options that are set, in that order
    pub fn configuration(&self) -> CommandSequence {
        let mut seq = CommandSequence::new();
        if let Some(height) = self.height {
            seq.push(vec![0x1D, 0x68, height.get()]);
        }
        if let Some(width) = self.width {
            seq.push(vec![0x1D, 0x77, width.code()]);
        }
        if let Some(hri) = self.hri {
            seq.push(vec![0x1D, 0x48, hri.code()]);
        }
        seq
    }
}

impl QrCodeOptions {
    pub fn module_size(mut self, size: QrModuleSize) -> Self {
        self.module_size = Some(size);
        self
    }

    pub fn ecc_level(mut self, level: QrEccLevel) -> Self {
        self.ecc_level = Some(level);
        self
    }

    /// Build options from keyword pairs such as `("qrcode_ecc_level", "H")`
    pub fn from_keywords<'a>(
        keywords: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> PrintResult<Self> {
        let mut options = Self::default();
        for (name, value) in keywords {
            match name {
                "qrcode_module_size" => {
                    let size = value
                        .trim()
                        .parse::<u8>()
                        .ok()
                        .and_then(QrModuleSize::new)
                        .ok_or_else(|| invalid_value(name, value))?;
                    options.module_size = Some(size);
                }
                "qrcode_ecc_level" => {
                    options.ecc_level =
                        Some(value.parse().map_err(|_| invalid_value(name, value))?);
                }
                _ => return Err(PrintError::UnexpectedKeyword(name.to_string())),
            }
        }
        Ok(options)
    }
}

/// How a vendor splits a payload length into a low/high byte pair
///
/// Bematech divides by 255 while Daruma and the standard `GS ( k` QR
/// commands divide by 256. Both are kept as observed on the devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthBase {
    Modulo255,
    Modulo256,
}

impl LengthBase {
    /// `(low, high)` for `len`
    pub fn split(self, len: usize) -> PrintResult<(u8, u8)> {
        let base = match self {
            LengthBase::Modulo255 => 255,
            LengthBase::Modulo256 => 256,
        };
        let high = u8::try_from(len / base).map_err(|_| {
            PrintError::InvalidBarcode(format!("data is {} bytes long, too long to encode", len))
        })?;
        Ok(((len % base) as u8, high))
    }
}

/// Bytes for one barcode plus how long to wait before reading the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeCommand {
    pub sequence: CommandSequence,
    pub settle: Duration,
}

impl BarcodeCommand {
    pub fn new(sequence: CommandSequence, settle: Duration) -> Self {
        Self { sequence, settle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_keywords() {
        let options = BarcodeOptions::from_keywords([]).unwrap();
        assert_eq!(options, BarcodeOptions::default());

        let options = BarcodeOptions::from_keywords([
            ("barcode_height", "100"),
            ("barcode_width", "double"),
            ("barcode_hri", "both"),
        ])
        .unwrap();
        assert_eq!(options.height.map(NonZeroU8::get), Some(100));
        assert_eq!(options.width, Some(BarcodeWidth::Double));
        assert_eq!(options.hri, Some(BarcodeHri::Both));
    }

    #[test]
    fn test_barcode_keyword_errors() {
        let err = BarcodeOptions::from_keywords([("no_bars", "123")]).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected keyword argument: 'no_bars'");

        let err = BarcodeOptions::from_keywords([("barcode_height", "0")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid argument value: barcode_height=0");

        assert!(matches!(
            BarcodeOptions::from_keywords([("barcode_height", "256")]),
            Err(PrintError::InvalidKeywordValue { .. })
        ));
        assert!(matches!(
            BarcodeOptions::from_keywords([("barcode_width", "triple")]),
            Err(PrintError::InvalidKeywordValue { .. })
        ));
        assert!(matches!(
            BarcodeOptions::from_keywords([("qrcode_ecc_level", "L")]),
            Err(PrintError::UnexpectedKeyword(_))
        ));
    }

    #[test]
    fn test_qrcode_keywords() {
        let options = QrCodeOptions::from_keywords([
            ("qrcode_ecc_level", "L"),
            ("qrcode_module_size", "4"),
        ])
        .unwrap();
        assert_eq!(options.ecc_level, Some(QrEccLevel::L));
        assert_eq!(options.module_size.map(QrModuleSize::dots), Some(4));

        let err = QrCodeOptions::from_keywords([("oops", "123")]).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected keyword argument: 'oops'");

        let err = QrCodeOptions::from_keywords([("qrcode_ecc_level", "IMPOSSIBLE")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument value: qrcode_ecc_level=IMPOSSIBLE"
        );

        assert!(QrCodeOptions::from_keywords([("qrcode_module_size", "3")]).is_err());
        assert!(QrCodeOptions::from_keywords([("qrcode_module_size", "9")]).is_err());
    }

    #[test]
    fn test_configuration_only_for_set_options() {
        assert!(BarcodeOptions::default().configuration().is_empty());

        let options = BarcodeOptions::default()
            .height(90)
            .unwrap()
            .width(BarcodeWidth::Normal)
            .hri(BarcodeHri::Bottom);
        assert_eq!(
            options.configuration().to_bytes(),
            vec![0x1D, 0x68, 0x5A, 0x1D, 0x77, 0x02, 0x1D, 0x48, 0x02]
        );

        let only_hri = BarcodeOptions::default().hri(BarcodeHri::Top);
        assert_eq!(only_hri.configuration().to_bytes(), vec![0x1D, 0x48, 0x01]);
    }

    #[test]
    fn test_length_bases_differ() {
        assert_eq!(LengthBase::Modulo255.split(22).unwrap(), (22, 0));
        assert_eq!(LengthBase::Modulo256.split(22).unwrap(), (22, 0));
        assert_eq!(LengthBase::Modulo255.split(255).unwrap(), (0, 1));
        assert_eq!(LengthBase::Modulo256.split(255).unwrap(), (255, 0));
        assert_eq!(LengthBase::Modulo255.split(600).unwrap(), (90, 2));
        assert_eq!(LengthBase::Modulo256.split(600).unwrap(), (88, 2));
        assert!(LengthBase::Modulo256.split(65536).is_err());
    }

    #[test]
    fn test_module_size_range() {
        assert!(QrModuleSize::new(3).is_none());
        assert_eq!(QrModuleSize::new(8), Some(QrModuleSize::MAX));
        assert_eq!(QrModuleSize::default().to_string(), "4-dot");
    }
}
