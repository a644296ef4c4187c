//! Printer connections
//!
//! Every transport exposes the same lifecycle:
//!
//! - `catch()` opens the OS resource and may be called again after `release()`
//! - `write()` delivers all bytes or fails
//! - `read()` returns whatever response bytes are pending, empty when none
//! - `release()` closes the resource and is safe to call twice
//!
//! Transient I/O failures are retried inside each transport under the
//! [`RetryPolicy`] handed over at construction time.

use std::fmt;
use std::str::FromStr;

use crate::error::{PrintError, PrintResult};
use crate::retry::RetryPolicy;

pub mod bluetooth;
pub mod cups;
pub mod dummy;
pub mod file;
pub mod network;
pub mod serial;
#[cfg(feature = "usb")]
pub mod usb;
#[cfg(windows)]
pub mod win32;

pub use bluetooth::BluetoothConnection;
pub use cups::CupsConnection;
pub use dummy::DummyConnection;
pub use file::FileConnection;
pub use network::NetworkConnection;
pub use serial::{SerialConnection, SerialSettings};
#[cfg(feature = "usb")]
pub use usb::{UsbConnection, UsbSettings};
#[cfg(windows)]
pub use win32::Win32RawConnection;

/// Uniform printer link
pub trait Connection {
    /// Open the underlying resource
    fn catch(&mut self) -> PrintResult<()>;

    /// Deliver all of `data`
    fn write(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Pending response bytes, empty when there are none
    fn read(&mut self) -> PrintResult<Vec<u8>>;

    /// Close the underlying resource
    fn release(&mut self) -> PrintResult<()>;

    fn is_open(&self) -> bool;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn catch(&mut self) -> PrintResult<()> {
        (**self).catch()
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        (**self).write(data)
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        (**self).read()
    }

    fn release(&mut self) -> PrintResult<()> {
        (**self).release()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Transport registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Bluetooth,
    Cups,
    Dummy,
    File,
    Network,
    Serial,
    Usb,
    Win32,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 8] = [
        ConnectionKind::Bluetooth,
        ConnectionKind::Cups,
        ConnectionKind::Dummy,
        ConnectionKind::File,
        ConnectionKind::Network,
        ConnectionKind::Serial,
        ConnectionKind::Usb,
        ConnectionKind::Win32,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Bluetooth => "bluetooth",
            ConnectionKind::Cups => "cups",
            ConnectionKind::Dummy => "dummy",
            ConnectionKind::File => "file",
            ConnectionKind::Network => "network",
            ConnectionKind::Serial => "serial",
            ConnectionKind::Usb => "usb",
            ConnectionKind::Win32 => "win32",
        }
    }

    /// Human friendly name
    pub fn name(self) -> &'static str {
        match self {
            ConnectionKind::Bluetooth => "Bluetooth (RFCOMM)",
            ConnectionKind::Cups => "CUPS print queue",
            ConnectionKind::Dummy => "Dummy (in memory)",
            ConnectionKind::File => "File or device node",
            ConnectionKind::Network => "Network (TCP/IP)",
            ConnectionKind::Serial => "Serial (RS-232)",
            ConnectionKind::Usb => "USB (bulk endpoints)",
            ConnectionKind::Win32 => "Windows print spooler (RAW)",
        }
    }

    /// Example settings string
    pub fn settings_example(self) -> &'static str {
        match self {
            ConnectionKind::Bluetooth => "00:01:02:03:04:05/1",
            ConnectionKind::Cups => "localhost,receipt-printer",
            ConnectionKind::Dummy => "",
            ConnectionKind::File => "/dev/usb/lp0",
            ConnectionKind::Network => "192.168.0.100:9100",
            ConnectionKind::Serial => "/dev/ttyS0:9600,8,1,N,RTSCTS",
            ConnectionKind::Usb => "0x0492:0x8760,interface=0x0,ep_in=0x0,ep_out=0x3",
            ConnectionKind::Win32 => "EPSON TM-T20",
        }
    }

    /// Build an unopened connection from a settings string
    pub fn create(self, settings: &str, policy: RetryPolicy) -> PrintResult<Box<dyn Connection>> {
        let conn: Box<dyn Connection> = match self {
            ConnectionKind::Bluetooth => Box::new(BluetoothConnection::create(settings, policy)?),
            ConnectionKind::Cups => Box::new(CupsConnection::create(settings)?),
            ConnectionKind::Dummy => Box::new(DummyConnection::new()),
            ConnectionKind::File => Box::new(FileConnection::create(settings)),
            ConnectionKind::Network => Box::new(NetworkConnection::create(settings, policy)?),
            ConnectionKind::Serial => Box::new(SerialConnection::create(settings, policy)?),
            #[cfg(feature = "usb")]
            ConnectionKind::Usb => Box::new(UsbConnection::create(settings, policy)?),
            #[cfg(not(feature = "usb"))]
            ConnectionKind::Usb => {
                return Err(PrintError::InvalidConfig(
                    "USB support is disabled in this build".to_string(),
                ));
            }
            #[cfg(windows)]
            ConnectionKind::Win32 => Box::new(Win32RawConnection::create(settings)),
            #[cfg(not(windows))]
            ConnectionKind::Win32 => {
                return Err(PrintError::InvalidConfig(
                    "Windows spooler is only available on Windows".to_string(),
                ));
            }
        };
        Ok(conn)
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PrintError::InvalidConfig(format!("Unknown connection type: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        for kind in ConnectionKind::ALL {
            assert_eq!(kind.as_str().parse::<ConnectionKind>().unwrap(), kind);
            assert!(!kind.name().is_empty());
        }
        assert!("parallel".parse::<ConnectionKind>().is_err());
    }

    #[test]
    fn test_create_dummy() {
        let mut conn = ConnectionKind::Dummy
            .create("", RetryPolicy::default())
            .unwrap();
        conn.catch().unwrap();
        conn.write(b"hello").unwrap();
        assert!(conn.is_open());
        conn.release().unwrap();
    }

    #[test]
    fn test_create_rejects_bad_settings() {
        let policy = RetryPolicy::default();
        assert!(ConnectionKind::Network.create("no-port", policy).is_err());
        assert!(ConnectionKind::Serial.create("/dev/ttyS0:123,8,1,N", policy).is_err());
        assert!(ConnectionKind::Bluetooth.create("not-an-address", policy).is_err());
        assert!(ConnectionKind::Cups.create("only-host", policy).is_err());
    }

    #[test]
    fn test_create_network_does_not_connect() {
        let conn = ConnectionKind::Network
            .create("192.0.2.1:9100", RetryPolicy::default())
            .unwrap();
        assert!(!conn.is_open());
    }
}
