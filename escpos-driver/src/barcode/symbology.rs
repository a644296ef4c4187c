//! Generic `GS k` 1D barcodes

use crate::command::CommandSequence;
use crate::error::{PrintError, PrintResult};

use super::BarcodeOptions;

/// Symbologies of the ESC/POS `GS k` family
///
/// Function A symbologies are terminated by NUL; function B symbologies
/// carry a one byte length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
    /// UPC-A through function B
    UpcAB,
    Code93,
    Code128,
    Gs1_128,
    Gs1DataBarOmnidirectional,
    Gs1DataBarTruncated,
    Gs1DataBarLimited,
    Gs1DataBarExpanded,
}

impl Symbology {
    /// The `m` byte of `GS k m`
    pub fn code(self) -> u8 {
        match self {
            Symbology::UpcA => 0,
            Symbology::UpcE => 1,
            Symbology::Ean13 => 2,
            Symbology::Ean8 => 3,
            Symbology::Code39 => 4,
            Symbology::Itf => 5,
            Symbology::Codabar => 6,
            Symbology::UpcAB => 65,
            Symbology::Code93 => 72,
            Symbology::Code128 => 73,
            Symbology::Gs1_128 => 74,
            Symbology::Gs1DataBarOmnidirectional => 75,
            Symbology::Gs1DataBarTruncated => 76,
            Symbology::Gs1DataBarLimited => 77,
            Symbology::Gs1DataBarExpanded => 78,
        }
    }

    pub fn is_null_terminated(self) -> bool {
        self.code() < 65
    }
}

/// Build `[GS h][GS w][GS H] GS k m ...` for `payload`
///
/// Null terminated payloads must not contain NUL; length prefixed payloads
/// must fit in 255 bytes.
pub fn encode_barcode(
    symbology: Symbology,
    payload: &[u8],
    options: &BarcodeOptions,
) -> PrintResult<CommandSequence> {
    let mut command = vec![0x1D, 0x6B, symbology.code()];

    if symbology.is_null_terminated() {
        if payload.contains(&0) {
            return Err(PrintError::InvalidBarcode(format!(
                "{:?} data must not contain NUL",
                symbology
            )));
        }
        command.extend_from_slice(payload);
        command.push(0x00);
    } else {
        let len = u8::try_from(payload.len()).map_err(|_| {
            PrintError::InvalidBarcode(format!(
                "{:?} data is {} bytes long (max 255)",
                symbology,
                payload.len()
            ))
        })?;
        command.push(len);
        command.extend_from_slice(payload);
    }

    let mut seq = options.configuration();
    seq.push(command);
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::BarcodeHri;

    const NULL_TERMINATED: [Symbology; 7] = [
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::Code39,
        Symbology::Itf,
        Symbology::Codabar,
    ];

    const LENGTH_PREFIXED: [Symbology; 8] = [
        Symbology::UpcAB,
        Symbology::Code93,
        Symbology::Code128,
        Symbology::Gs1_128,
        Symbology::Gs1DataBarOmnidirectional,
        Symbology::Gs1DataBarTruncated,
        Symbology::Gs1DataBarLimited,
        Symbology::Gs1DataBarExpanded,
    ];

    #[test]
    fn test_null_terminated_family() {
        let payload = b"0123456789";
        for symbology in NULL_TERMINATED {
            let bytes = encode_barcode(symbology, payload, &BarcodeOptions::default())
                .unwrap()
                .to_bytes();
            assert_eq!(&bytes[..3], &[0x1D, 0x6B, symbology.code()]);
            assert_eq!(&bytes[3..bytes.len() - 1], payload);
            assert_eq!(bytes.last(), Some(&0x00));
            assert_eq!(bytes[3..].iter().filter(|b| **b == 0).count(), 1);
        }
    }

    #[test]
    fn test_length_prefixed_family() {
        for len in [0usize, 1, 20, 255] {
            let payload = vec![b'A'; len];
            for symbology in LENGTH_PREFIXED {
                let bytes = encode_barcode(symbology, &payload, &BarcodeOptions::default())
                    .unwrap()
                    .to_bytes();
                assert_eq!(&bytes[..3], &[0x1D, 0x6B, symbology.code()]);
                assert_eq!(bytes[3] as usize, len);
                assert_eq!(&bytes[4..], payload.as_slice());
            }
        }
    }

    #[test]
    fn test_oversized_length_prefixed_payload_rejected() {
        let payload = vec![b'A'; 256];
        assert!(matches!(
            encode_barcode(Symbology::Code128, &payload, &BarcodeOptions::default()),
            Err(PrintError::InvalidBarcode(_))
        ));
    }

    #[test]
    fn test_nul_in_terminated_payload_rejected() {
        assert!(matches!(
            encode_barcode(Symbology::Code39, b"AB\0C", &BarcodeOptions::default()),
            Err(PrintError::InvalidBarcode(_))
        ));
    }

    #[test]
    fn test_configuration_precedes_barcode() {
        let options = BarcodeOptions::default().hri(BarcodeHri::Bottom);
        let seq = encode_barcode(Symbology::Ean8, b"1234567", &options).unwrap();
        assert_eq!(seq.chunks().len(), 2);
        assert_eq!(seq.chunks()[0], vec![0x1D, 0x48, 0x02]);
        assert_eq!(seq.chunks()[1][..3], [0x1D, 0x6B, 0x03]);
    }
}
