//! Validated fixed-format barcode payloads

use std::sync::LazyLock;

use regex::Regex;

use crate::command::CommandSequence;
use crate::error::{PrintError, PrintResult};

use super::{BarcodeOptions, Symbology, encode_barcode};

static EAN13_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{12,13}$").unwrap());
static EAN8_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{7,8}$").unwrap());
static CODE128_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\x20-\x7F]*$").unwrap());

/// EAN-13 digits without the check digit (the printer computes it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ean13(String);

impl Ean13 {
    /// Accepts 12 or 13 ASCII digits; a 13th digit is dropped.
    pub fn new(data: &str) -> PrintResult<Self> {
        if !EAN13_RE.is_match(data) {
            return Err(PrintError::InvalidBarcode(format!(
                "EAN-13 requires 12 or 13 digits; got {:?}",
                data
            )));
        }
        Ok(Self(data[..12].to_string()))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    pub fn render(&self, options: &BarcodeOptions) -> PrintResult<CommandSequence> {
        encode_barcode(Symbology::Ean13, self.0.as_bytes(), options)
    }
}

/// EAN-8 digits without the check digit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ean8(String);

impl Ean8 {
    /// Accepts 7 or 8 ASCII digits; an 8th digit is dropped.
    pub fn new(data: &str) -> PrintResult<Self> {
        if !EAN8_RE.is_match(data) {
            return Err(PrintError::InvalidBarcode(format!(
                "EAN-8 requires 7 or 8 digits; got {:?}",
                data
            )));
        }
        Ok(Self(data[..7].to_string()))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    pub fn render(&self, options: &BarcodeOptions) -> PrintResult<CommandSequence> {
        encode_barcode(Symbology::Ean8, self.0.as_bytes(), options)
    }
}

/// Code 128 data restricted to 0x20..=0x7F
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code128(String);

impl Code128 {
    pub fn new(data: &str) -> PrintResult<Self> {
        if !CODE128_RE.is_match(data) {
            return Err(PrintError::InvalidBarcode(format!(
                "Code128 accepts only ASCII 0x20-0x7F; got {:?}",
                data
            )));
        }
        Ok(Self(data.to_string()))
    }

    pub fn data(&self) -> &str {
        &self.0
    }

    pub fn render(&self, options: &BarcodeOptions) -> PrintResult<CommandSequence> {
        encode_barcode(Symbology::Code128, self.0.as_bytes(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ean13_truncates_check_digit() {
        let code = Ean13::new("4006381333931").unwrap();
        assert_eq!(code.digits(), "400638133393");

        // wrong check digit is dropped all the same
        let code = Ean13::new("4006381333930").unwrap();
        assert_eq!(code.digits(), "400638133393");

        let bytes = code.render(&BarcodeOptions::default()).unwrap().to_bytes();
        assert_eq!(bytes, b"\x1D\x6B\x02400638133393\x00".to_vec());
    }

    #[test]
    fn test_ean13_rejects() {
        for bad in ["", "12345678901", "12345678901234", "40063813339a", "４００６３８１３３３９３"] {
            assert!(
                matches!(Ean13::new(bad), Err(PrintError::InvalidBarcode(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_ean8_truncates_check_digit() {
        assert_eq!(Ean8::new("96385074").unwrap().digits(), "9638507");
        assert_eq!(Ean8::new("9638507").unwrap().digits(), "9638507");
        assert!(Ean8::new("963850").is_err());
        assert!(Ean8::new("963850741").is_err());

        let bytes = Ean8::new("96385074")
            .unwrap()
            .render(&BarcodeOptions::default())
            .unwrap()
            .to_bytes();
        assert_eq!(bytes, b"\x1D\x6B\x039638507\x00".to_vec());
    }

    #[test]
    fn test_code128_charset() {
        assert!(Code128::new("").is_ok());
        assert!(Code128::new(" ~\x7F").is_ok());
        assert!(Code128::new("123EGGS").is_ok());
        assert!(Code128::new("tab\there").is_err());
        assert!(Code128::new("\x1F").is_err());
        assert!(Code128::new("ação").is_err());

        let bytes = Code128::new("123EGGS")
            .unwrap()
            .render(&BarcodeOptions::default())
            .unwrap()
            .to_bytes();
        assert_eq!(bytes, b"\x1D\x6B\x49\x07123EGGS".to_vec());
    }
}
