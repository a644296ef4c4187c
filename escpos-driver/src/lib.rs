//! # escpos-driver
//!
//! ESC/POS point-of-sale printer driver.
//!
//! ## Scope
//!
//! - Vendor command sets (Epson, Bematech, Daruma, Elgin, Control iD and
//!   OEM models) behind small capability traits
//! - Barcode and QR code encoders with vendor specific byte layouts
//! - Connections: network (TCP 9100), serial, Bluetooth RFCOMM, USB bulk,
//!   CUPS, file, Windows spooler and an in-memory dummy
//! - Exponential backoff retry shared by every transport
//!
//! ## Example
//!
//! ```ignore
//! use escpos_driver::{ModelId, NetworkConnection, Printer, RetryPolicy};
//!
//! let conn = NetworkConnection::create("192.168.1.100:9100", RetryPolicy::default())?;
//! let mut printer = Printer::new(conn, ModelId::ElginI9.model())?;
//! printer.init()?;
//! printer.text_center("Hello World!")?;
//! printer.qrcode("https://example.com", &Default::default())?;
//! printer.cut(true)?;
//! printer.release()?;
//! ```

pub mod asc;
pub mod barcode;
pub mod command;
pub mod config;
pub mod conn;
mod encoding;
mod error;
pub mod feature;
mod hexdump;
pub mod model;
mod printer;
pub mod retry;
pub mod vendor;

// Re-exports
pub use barcode::{
    BarcodeCommand, BarcodeHri, BarcodeOptions, BarcodeWidth, QrCodeOptions, QrEccLevel,
    QrModuleSize,
};
pub use config::RetrySettings;
pub use conn::{
    BluetoothConnection, Connection, ConnectionKind, CupsConnection, DummyConnection,
    FileConnection, NetworkConnection, SerialConnection, SerialSettings,
};
pub use encoding::{EncodingErrors, encode_text, encoded_width, pad_to_width, truncate_to_width};
pub use error::{PrintError, PrintResult};
pub use feature::{Columns, Feature, HardwareFeatures};
pub use hexdump::hexdump;
pub use model::{Implementation, Model, ModelId, ModelInfo, SortBy, find_implementations};
pub use printer::Printer;
pub use retry::{Backoff, RetryPolicy};
pub use vendor::DrawerPulse;

#[cfg(feature = "usb")]
pub use conn::{UsbConnection, UsbSettings};

#[cfg(windows)]
pub use conn::Win32RawConnection;
