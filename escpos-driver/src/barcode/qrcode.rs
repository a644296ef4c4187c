//! Standard ESC/POS QR code (`GS ( k`, cn = 49)

use crate::command::CommandSequence;
use crate::error::PrintResult;

use super::{LengthBase, QrCodeOptions};

const GS_PAREN_K: [u8; 3] = [0x1D, 0x28, 0x6B];

/// Store, set ECC, set module size, print
///
/// The four sub-commands are always emitted in this order since the data
/// has to be in the symbol storage area before the print function runs.
/// Unset options fall back to ECC level L and 4-dot modules.
pub fn encode_qrcode(data: &[u8], options: &QrCodeOptions) -> PrintResult<CommandSequence> {
    // pL pH count the data plus cn, fn and m
    let (p_l, p_h) = LengthBase::Modulo256.split(data.len() + 3)?;

    let ecc = options.ecc_level.unwrap_or_default();
    let module = options.module_size.unwrap_or_default();

    let mut store = Vec::with_capacity(data.len() + 8);
    store.extend_from_slice(&GS_PAREN_K);
    store.extend_from_slice(&[p_l, p_h, 0x31, 0x50, 0x30]);
    store.extend_from_slice(data);

    let mut seq = CommandSequence::new();
    seq.push(store)
        .push(function(0x45, ecc.code()))
        .push(function(0x43, module.dots()))
        .push(function(0x51, 0x30));
    Ok(seq)
}

/// Three byte parameter function: `GS ( k 3 0 49 fn n`
fn function(fn_code: u8, n: u8) -> Vec<u8> {
    vec![
        GS_PAREN_K[0],
        GS_PAREN_K[1],
        GS_PAREN_K[2],
        0x03,
        0x00,
        0x31,
        fn_code,
        n,
    ]
}
