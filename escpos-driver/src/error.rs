//! Error types for the printer library

use std::io::ErrorKind;

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Cannot open or resolve the underlying medium
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket did not become writable within the readiness timeout
    #[error("Socket not writable: {0}")]
    NotWritable(String),

    /// Socket did not become readable within the readiness timeout
    #[error("Socket not readable: {0}")]
    NotReadable(String),

    /// The OS accepted zero bytes (broken pipe semantics)
    #[error("Connection broken: {0}")]
    Broken(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer or connection configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Malformed configuration file
    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),

    /// Keyword option outside the recognized set
    #[error("Unexpected keyword argument: '{0}'")]
    UnexpectedKeyword(String),

    /// Keyword option with a value outside its domain
    #[error("Invalid argument value: {name}={value}")]
    InvalidKeywordValue { name: String, value: String },

    /// Plain value error (out of range duration, text size, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Barcode payload with wrong digit count, charset or length
    #[error("Invalid barcode data: {0}")]
    InvalidBarcode(String),

    /// Text cannot be represented in the printer encoding
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Cash drawer port not exposed by this printer
    #[error("Cash drawer error: {0}")]
    CashDrawer(String),

    /// RFCOMM port lookup failed
    #[error("Bluetooth port discovery failed: {0}")]
    BluetoothDiscovery(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// USB error
    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Command set does not implement this operation
    #[error("Operation not implemented by this command set: {0}")]
    Unsupported(&'static str),

    /// Windows-specific printing error
    #[cfg(windows)]
    #[error("Windows printer error: {0}")]
    WindowsPrinter(String),
}

impl PrintError {
    /// Base classification shared by every transport.
    ///
    /// Readiness, broken-pipe and timeout conditions are transient, as is any
    /// OS level I/O error except the ones that point at a caller or setup
    /// problem (missing device, permissions, bad input).
    pub fn is_transient(&self) -> bool {
        match self {
            PrintError::Io(e) => is_transient_io(e.kind()),
            PrintError::NotWritable(_)
            | PrintError::NotReadable(_)
            | PrintError::Broken(_)
            | PrintError::Timeout(_) => true,
            PrintError::Serial(e) => match e.kind() {
                serialport::ErrorKind::Io(kind) => is_transient_io(kind),
                _ => false,
            },
            #[cfg(feature = "usb")]
            PrintError::Usb(e) => matches!(
                e,
                rusb::Error::Io
                    | rusb::Error::Timeout
                    | rusb::Error::Pipe
                    | rusb::Error::Busy
                    | rusb::Error::Interrupted
                    | rusb::Error::Overflow
            ),
            _ => false,
        }
    }

    /// Whether the failure means the link itself is gone and must be
    /// released and caught again before the next attempt.
    pub fn needs_reconnect(&self) -> bool {
        match self {
            PrintError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ),
            PrintError::Broken(_) => true,
            _ => false,
        }
    }
}

fn is_transient_io(kind: ErrorKind) -> bool {
    !matches!(
        kind,
        ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::InvalidInput
            | ErrorKind::InvalidData
            | ErrorKind::Unsupported
    )
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_classification() {
        let reset = PrintError::Io(io::Error::from(ErrorKind::ConnectionReset));
        assert!(reset.is_transient());
        assert!(reset.needs_reconnect());

        let refused = PrintError::Io(io::Error::from(ErrorKind::ConnectionRefused));
        assert!(refused.is_transient());
        assert!(!refused.needs_reconnect());

        let denied = PrintError::Io(io::Error::from(ErrorKind::PermissionDenied));
        assert!(!denied.is_transient());
    }

    #[test]
    fn test_validation_errors_are_never_transient() {
        assert!(!PrintError::UnexpectedKeyword("oops".into()).is_transient());
        assert!(!PrintError::CashDrawer("port 3".into()).is_transient());
        assert!(!PrintError::InvalidConfig("bad".into()).is_transient());
        assert!(!PrintError::Unsupported("set_expanded").is_transient());
    }

    #[test]
    fn test_keyword_messages() {
        let e = PrintError::UnexpectedKeyword("no_bars".into());
        assert_eq!(e.to_string(), "Unexpected keyword argument: 'no_bars'");

        let e = PrintError::InvalidKeywordValue {
            name: "barcode_height".into(),
            value: "0".into(),
        };
        assert_eq!(e.to_string(), "Invalid argument value: barcode_height=0");
    }
}
