//! USB printers over bulk endpoints
//!
//! Settings look like `0492:8760,interface=0,ep_out=3,ep_in=0`. Every
//! number is hexadecimal, with or without a `0x` prefix.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use rusb::{DeviceHandle, GlobalContext};
use tracing::{debug, instrument};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;
use crate::retry::{Backoff, RetryPolicy};

/// USB device/interface class of printers
pub const PRINTER_CLASS: u8 = 0x07;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

const READ_BUFSIZE: usize = 512;

static RE_VENDOR_PRODUCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:0x)?([0-9a-f]{1,4})\s*:\s*(?:0x)?([0-9a-f]{1,4})\s*$").unwrap()
});

static RE_KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([a-z_]+)\s*=\s*(?:0x)?([0-9a-f]{1,2})\s*$").unwrap()
});

/// Device ids, interface and endpoint addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    /// Bulk-in endpoint; zero disables reads
    pub ep_in: u8,
    pub ep_out: u8,
}

impl UsbSettings {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            interface: 0,
            ep_in: 0,
            ep_out: 0,
        }
    }

    pub fn parse(value: &str) -> PrintResult<Self> {
        let invalid = || PrintError::InvalidConfig(format!("Invalid USB settings: {}", value));

        let mut fields = value.split(',');
        let ids = fields.next().unwrap_or_default();
        let caps = RE_VENDOR_PRODUCT.captures(ids).ok_or_else(invalid)?;
        let vendor_id = u16::from_str_radix(&caps[1], 16).map_err(|_| invalid())?;
        let product_id = u16::from_str_radix(&caps[2], 16).map_err(|_| invalid())?;

        let mut settings = Self::new(vendor_id, product_id);
        for field in fields {
            let caps = RE_KEY_VALUE.captures(field).ok_or_else(invalid)?;
            let number = u8::from_str_radix(&caps[2], 16).map_err(|_| invalid())?;
            match caps[1].to_ascii_lowercase().as_str() {
                "interface" => settings.interface = number,
                "ep_in" => settings.ep_in = number,
                "ep_out" => settings.ep_out = number,
                other => {
                    return Err(PrintError::InvalidConfig(format!(
                        "Unknown USB setting '{}' in {}",
                        other, value
                    )));
                }
            }
        }
        Ok(settings)
    }

    fn details(&self, message: &str) -> String {
        format!(
            "{} (idVendor={:04x}, idProduct={:04x}, interface={:x}, ep_in={:x}, ep_out={:x})",
            message, self.vendor_id, self.product_id, self.interface, self.ep_in, self.ep_out
        )
    }
}

impl FromStr for UsbSettings {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UsbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04x}:0x{:04x},interface=0x{:x},ep_in=0x{:x},ep_out=0x{:x}",
            self.vendor_id, self.product_id, self.interface, self.ep_in, self.ep_out
        )
    }
}

/// USB printer found on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbPrinterInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
}

/// Devices whose device class, or any interface class, is printer (07h)
pub fn find_printers() -> PrintResult<Vec<UsbPrinterInfo>> {
    let mut printers = Vec::new();
    for device in rusb::devices()?.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        let printer_interface = || {
            (0..desc.num_configurations()).any(|i| {
                device.config_descriptor(i).is_ok_and(|config| {
                    config
                        .interfaces()
                        .any(|iface| iface.descriptors().any(|d| d.class_code() == PRINTER_CLASS))
                })
            })
        };
        if desc.class_code() == PRINTER_CLASS || printer_interface() {
            printers.push(UsbPrinterInfo {
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
                bus_number: device.bus_number(),
                address: device.address(),
            });
        }
    }
    Ok(printers)
}

/// Open device with its interface claimed
pub trait BulkDevice {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> PrintResult<usize>;

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> PrintResult<usize>;
}

/// Opens [`BulkDevice`]s
pub trait UsbOpener {
    type Device: BulkDevice;

    fn open(&self, settings: &UsbSettings) -> PrintResult<Self::Device>;
}

/// libusb through `rusb`
#[derive(Debug, Clone, Copy, Default)]
pub struct LibUsb;

pub struct ClaimedDevice {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
}

impl UsbOpener for LibUsb {
    type Device = ClaimedDevice;

    fn open(&self, settings: &UsbSettings) -> PrintResult<ClaimedDevice> {
        let mut handle = rusb::open_device_with_vid_pid(settings.vendor_id, settings.product_id)
            .ok_or_else(|| {
                PrintError::Connection(settings.details("cannot find specified printer"))
            })?;

        let interface = settings.interface;
        if handle.kernel_driver_active(interface).unwrap_or(false) {
            handle.detach_kernel_driver(interface).map_err(|e| {
                PrintError::Connection(
                    settings.details(&format!("unable to detach kernel driver: {}", e)),
                )
            })?;
        }

        let config = handle.device().config_descriptor(0)?.number();
        if handle.active_configuration().ok() != Some(config) {
            handle.set_active_configuration(config).map_err(|e| {
                PrintError::Connection(
                    settings.details(&format!("unable to set configuration: {}", e)),
                )
            })?;
        }
        handle.claim_interface(interface)?;

        Ok(ClaimedDevice { handle, interface })
    }
}

impl BulkDevice for ClaimedDevice {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> PrintResult<usize> {
        Ok(self.handle.write_bulk(endpoint, data, timeout)?)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> PrintResult<usize> {
        Ok(self.handle.read_bulk(endpoint, buf, timeout)?)
    }
}

impl Drop for ClaimedDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!(error = %e, "release interface failed");
        }
    }
}

pub struct UsbConnection<O: UsbOpener = LibUsb> {
    settings: UsbSettings,
    opener: O,
    policy: RetryPolicy,
    device: Option<O::Device>,
    timeout: Duration,
}

impl UsbConnection<LibUsb> {
    pub fn create(settings: &str, policy: RetryPolicy) -> PrintResult<Self> {
        Ok(Self::new(UsbSettings::parse(settings)?, policy))
    }

    pub fn new(settings: UsbSettings, policy: RetryPolicy) -> Self {
        Self::with_opener(settings, policy, LibUsb)
    }
}

impl<O: UsbOpener> UsbConnection<O> {
    pub fn with_opener(settings: UsbSettings, policy: RetryPolicy, opener: O) -> Self {
        Self {
            settings,
            opener,
            policy,
            device: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bulk transfer timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settings(&self) -> &UsbSettings {
        &self.settings
    }

    fn raw_write(&mut self, data: &[u8]) -> PrintResult<()> {
        let mut total = 0;
        while total < data.len() {
            let Some(device) = self.device.as_mut() else {
                return Err(PrintError::NotWritable(
                    self.settings.details("device is not open"),
                ));
            };
            let sent = device.write_bulk(self.settings.ep_out, &data[total..], self.timeout)?;
            if sent == 0 {
                return Err(PrintError::Broken(
                    self.settings.details("bulk transfer accepted no data"),
                ));
            }
            total += sent;
        }
        Ok(())
    }
}

impl<O: UsbOpener> Connection for UsbConnection<O> {
    #[instrument(skip(self), fields(settings = %self.settings))]
    fn catch(&mut self) -> PrintResult<()> {
        let policy = self.policy;
        Backoff::new(&policy)
            .retry_if(PrintError::is_transient)
            .run(self, |conn| {
                conn.device = None;
                conn.device = Some(conn.opener.open(&conn.settings)?);
                debug!("usb device claimed");
                Ok(())
            })
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                "writing to USB port {}:\n{}",
                self.settings,
                hexdump(data)
            );
        }
        let policy = self.policy;
        Backoff::new(&policy)
            .retry_if(PrintError::is_transient)
            .run(self, |conn| conn.raw_write(data))
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        let ep_in = self.settings.ep_in;
        let Some(device) = self.device.as_mut().filter(|_| ep_in != 0) else {
            return Ok(Vec::new());
        };
        let mut buf = vec![0u8; READ_BUFSIZE];
        match device.read_bulk(ep_in, &mut buf, self.timeout) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => {
                debug!(error = %e, "nothing read");
                Ok(Vec::new())
            }
        }
    }

    fn release(&mut self) -> PrintResult<()> {
        if self.device.take().is_some() {
            debug!(settings = %self.settings, "usb device released");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_parse_settings() {
        let s = UsbSettings::parse("0492:8760,interface=0,ep_out=3,ep_in=0").unwrap();
        assert_eq!(s.vendor_id, 0x0492);
        assert_eq!(s.product_id, 0x8760);
        assert_eq!(s.interface, 0);
        assert_eq!(s.ep_out, 3);
        assert_eq!(s.ep_in, 0);
        assert_eq!(
            s.to_string(),
            "0x0492:0x8760,interface=0x0,ep_in=0x0,ep_out=0x3"
        );
        assert_eq!(s.to_string().parse::<UsbSettings>().unwrap(), s);

        let s = UsbSettings::parse("0x04B8:0x0E15, interface = 0x01, EP_IN=0x81").unwrap();
        assert_eq!(s.vendor_id, 0x04B8);
        assert_eq!(s.interface, 1);
        assert_eq!(s.ep_in, 0x81);
        assert_eq!(s.ep_out, 0);
    }

    #[test]
    fn test_parse_rejects_bad_settings() {
        for bad in [
            "",
            "0492",
            "0492:zzzz",
            "0492:8760,interface",
            "0492:8760,ep_out=0x100",
            "0492:8760,alt=1",
        ] {
            assert!(
                matches!(UsbSettings::parse(bad), Err(PrintError::InvalidConfig(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[derive(Default)]
    struct Bus {
        out: Vec<(u8, Vec<u8>)>,
        opens: usize,
        timeouts: usize,
    }

    struct FakeDevice(Rc<RefCell<Bus>>);

    impl BulkDevice for FakeDevice {
        fn write_bulk(&mut self, endpoint: u8, data: &[u8], _: Duration) -> PrintResult<usize> {
            let mut bus = self.0.borrow_mut();
            if bus.timeouts > 0 {
                bus.timeouts -= 1;
                return Err(PrintError::Usb(rusb::Error::Timeout));
            }
            let n = data.len().min(64);
            bus.out.push((endpoint, data[..n].to_vec()));
            Ok(n)
        }

        fn read_bulk(&mut self, _: u8, buf: &mut [u8], _: Duration) -> PrintResult<usize> {
            buf[0] = 0x16;
            Ok(1)
        }
    }

    struct FakeOpener(Rc<RefCell<Bus>>);

    impl UsbOpener for FakeOpener {
        type Device = FakeDevice;

        fn open(&self, _: &UsbSettings) -> PrintResult<FakeDevice> {
            self.0.borrow_mut().opens += 1;
            Ok(FakeDevice(self.0.clone()))
        }
    }

    fn fake(settings: &str) -> (UsbConnection<FakeOpener>, Rc<RefCell<Bus>>) {
        let bus = Rc::new(RefCell::new(Bus::default()));
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 2).unwrap();
        let conn = UsbConnection::with_opener(
            UsbSettings::parse(settings).unwrap(),
            policy,
            FakeOpener(bus.clone()),
        );
        (conn, bus)
    }

    #[test]
    fn test_write_goes_to_bulk_out() {
        let (mut conn, bus) = fake("0492:8760,ep_out=3");
        conn.catch().unwrap();
        let data = vec![0x55u8; 150];
        conn.write(&data).unwrap();

        let bus = bus.borrow();
        assert_eq!(bus.opens, 1);
        assert!(bus.out.iter().all(|(ep, _)| *ep == 3));
        let sent: Vec<u8> = bus.out.iter().flat_map(|(_, d)| d.clone()).collect();
        assert_eq!(sent, data);
    }

    #[test]
    fn test_timeout_is_retried() {
        let (mut conn, bus) = fake("0492:8760,ep_out=3");
        conn.catch().unwrap();
        bus.borrow_mut().timeouts = 2;
        conn.write(b"\x1B\x40").unwrap();
        assert_eq!(bus.borrow().out.len(), 1);
    }

    #[test]
    fn test_read_needs_ep_in() {
        let (mut conn, _) = fake("0492:8760,ep_out=3");
        conn.catch().unwrap();
        assert!(conn.read().unwrap().is_empty());

        let (mut conn, _) = fake("0492:8760,ep_out=3,ep_in=81");
        assert!(conn.read().unwrap().is_empty());
        conn.catch().unwrap();
        assert_eq!(conn.read().unwrap(), vec![0x16]);
        conn.release().unwrap();
        conn.release().unwrap();
        assert!(!conn.is_open());
    }
}
