//! Vendor proprietary barcode and QR code commands
//!
//! These replace the standard `GS k` / `GS ( k` families on printers that
//! understand only their own variants. Several parameter bytes have no
//! public documentation; the values below are the ones known to work on
//! real devices.

use std::time::Duration;

use crate::command::CommandSequence;
use crate::error::{PrintError, PrintResult};

use super::{
    BARCODE_SETTLE, BarcodeCommand, BarcodeHri, BarcodeOptions, BarcodeWidth, LengthBase,
    QrCodeOptions, QrEccLevel,
};

// === Bematech (ESC/Bematech) ===

pub const BEMATECH_QRCODE_SETTLE: Duration = Duration::from_secs(1);

/// Undocumented `GS k Q` parameters
const BEMATECH_QRCODE_PARAMS: [u8; 4] = [3, 8, 8, 1];

/// `GS k Q 3 8 8 1 lo hi data`, lengths in base 255
///
/// QR options are ignored: the command has no documented way to set them.
pub fn bematech_qrcode(data: &[u8]) -> PrintResult<BarcodeCommand> {
    let (lo, hi) = LengthBase::Modulo255.split(data.len())?;

    let mut command = Vec::with_capacity(data.len() + 9);
    command.extend_from_slice(&[0x1D, 0x6B, 0x51]);
    command.extend_from_slice(&BEMATECH_QRCODE_PARAMS);
    command.extend_from_slice(&[lo, hi]);
    command.extend_from_slice(data);

    Ok(BarcodeCommand::new(
        CommandSequence::single(command),
        BEMATECH_QRCODE_SETTLE,
    ))
}

/// Configuration commands followed by `GS k I len data`
pub fn bematech_code128(data: &[u8], options: &BarcodeOptions) -> PrintResult<BarcodeCommand> {
    let len = u8::try_from(data.len()).map_err(|_| {
        PrintError::InvalidBarcode(format!(
            "Code128 data is {} bytes long (max 255)",
            data.len()
        ))
    })?;

    let mut command = Vec::with_capacity(data.len() + 4);
    command.extend_from_slice(&[0x1D, 0x6B, 0x49, len]);
    command.extend_from_slice(data);

    let mut seq = options.configuration();
    seq.push(command);
    Ok(BarcodeCommand::new(seq, BARCODE_SETTLE))
}

// === Daruma ===

pub const DARUMA_QRCODE_SETTLE: Duration = Duration::from_millis(500);
pub const DARUMA_QRCODE_MAX_DATA: usize = 700;

const DARUMA_MIN_BARCODE_HEIGHT: u8 = 50;

/// Daruma `ESC b` symbology ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarumaSymbology {
    Ean13 = 1,
    Ean8 = 2,
    Code128 = 5,
}

fn daruma_width(width: BarcodeWidth) -> u8 {
    match width {
        BarcodeWidth::Normal => 2,
        BarcodeWidth::Double => 3,
        BarcodeWidth::Quadruple => 5,
    }
}

fn daruma_hri(hri: BarcodeHri) -> u8 {
    match hri {
        BarcodeHri::Bottom => 1,
        BarcodeHri::None | BarcodeHri::Top | BarcodeHri::Both => 0,
    }
}

fn daruma_ecc(level: Option<QrEccLevel>) -> u8 {
    match level {
        // the device has no distinct L level
        Some(QrEccLevel::L) | Some(QrEccLevel::M) => 77,
        Some(QrEccLevel::Q) => 81,
        Some(QrEccLevel::H) => 72,
        None => 0,
    }
}

/// `ESC b id width height hri data NUL`
///
/// Height is raised to at least 50 dots; HRI can only be on or off (bottom).
pub fn daruma_barcode(
    symbology: DarumaSymbology,
    data: &[u8],
    options: &BarcodeOptions,
) -> PrintResult<BarcodeCommand> {
    if data.contains(&0) {
        return Err(PrintError::InvalidBarcode(format!(
            "{:?} data must not contain NUL",
            symbology
        )));
    }

    let height = options
        .height
        .map_or(DARUMA_MIN_BARCODE_HEIGHT, |h| h.get().max(DARUMA_MIN_BARCODE_HEIGHT));
    let width = daruma_width(options.width.unwrap_or_default());
    let hri = daruma_hri(options.hri.unwrap_or_default());

    let mut command = Vec::with_capacity(data.len() + 7);
    command.extend_from_slice(&[0x1B, 0x62, symbology as u8, width, height, hri]);
    command.extend_from_slice(data);
    command.push(0x00);

    Ok(BarcodeCommand::new(
        CommandSequence::single(command),
        BARCODE_SETTLE,
    ))
}

/// `ESC 0x81 size_h size_l module ecc data`
///
/// The first size byte is `(len & 0xFF) + 2`, the second is `len >> 8`.
/// Unset options select the device's automatic mode (0); 8-dot modules are
/// printed as 7-dot.
pub fn daruma_qrcode(data: &[u8], options: &QrCodeOptions) -> PrintResult<BarcodeCommand> {
    if data.len() > DARUMA_QRCODE_MAX_DATA {
        return Err(PrintError::InvalidBarcode(format!(
            "too much data: {} bytes (max allowed is {})",
            data.len(),
            DARUMA_QRCODE_MAX_DATA
        )));
    }

    let (lo, hi) = LengthBase::Modulo256.split(data.len())?;
    let size_h = lo.checked_add(2).ok_or_else(|| {
        PrintError::InvalidBarcode(format!(
            "QR code data length {} cannot be encoded for this printer",
            data.len()
        ))
    })?;
    let module = options.module_size.map_or(0, |m| m.dots().min(7));
    let ecc = daruma_ecc(options.ecc_level);

    let mut command = Vec::with_capacity(data.len() + 6);
    command.extend_from_slice(&[0x1B, 0x81, size_h, hi, module, ecc]);
    command.extend_from_slice(data);

    Ok(BarcodeCommand::new(
        CommandSequence::single(command),
        DARUMA_QRCODE_SETTLE,
    ))
}
