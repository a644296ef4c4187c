//! Bluetooth RFCOMM printers
//!
//! Settings are `AA:BB:CC:DD:EE:FF[/port]`. Without a port, the RFCOMM
//! channel is looked up through the service discovery protocol.

use std::fmt;
use std::io;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::Connection;
use super::network::{Interest, NetStream};
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;
use crate::retry::{Backoff, RetryPolicy};

pub const DEFAULT_PORT: u8 = 1;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
const READ_BUFSIZE: usize = 1024;

/// Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Byte order of the kernel's `bdaddr_t`
    pub fn to_le_bytes(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl FromStr for BdAddr {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PrintError::InvalidConfig(format!("Invalid Bluetooth address: {}", s));
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

/// One advertised service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub host: BdAddr,
    pub name: Option<String>,
    pub protocol: String,
    pub port: Option<u8>,
}

/// SDP lookup
pub trait ServiceDiscovery {
    fn find_services(&self, address: &BdAddr) -> PrintResult<Vec<ServiceRecord>>;
}

/// Service discovery through BlueZ `sdptool browse`
#[derive(Debug, Clone)]
pub struct SdpTool {
    program: String,
}

impl Default for SdpTool {
    fn default() -> Self {
        Self {
            program: "sdptool".to_string(),
        }
    }
}

impl SdpTool {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ServiceDiscovery for SdpTool {
    fn find_services(&self, address: &BdAddr) -> PrintResult<Vec<ServiceRecord>> {
        let output = Command::new(&self.program)
            .arg("browse")
            .arg(address.to_string())
            .output()
            .map_err(|e| {
                PrintError::BluetoothDiscovery(format!("cannot run {}: {}", self.program, e))
            })?;
        if !output.status.success() {
            debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "sdptool browse failed"
            );
            return Ok(Vec::new());
        }
        Ok(parse_sdptool(address, &String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the service records printed by `sdptool browse`
fn parse_sdptool(host: &BdAddr, output: &str) -> Vec<ServiceRecord> {
    let mut records = Vec::new();
    let mut current: Option<ServiceRecord> = None;
    let mut has_handle = false;
    let mut in_protocol: Option<String> = None;

    let empty = |name: Option<String>| ServiceRecord {
        host: *host,
        name,
        protocol: String::new(),
        port: None,
    };

    for line in output.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Service Name:") {
            records.extend(current.take());
            current = Some(empty(Some(name.trim().to_string())));
            has_handle = false;
            in_protocol = None;
            continue;
        }
        if line.starts_with("Service RecHandle:") {
            if current.is_none() || has_handle {
                records.extend(current.take());
                current = Some(empty(None));
                in_protocol = None;
            }
            has_handle = true;
            continue;
        }

        let Some(record) = current.as_mut() else {
            continue;
        };
        if line.starts_with('"') {
            in_protocol = line.split('"').nth(1).map(str::to_string);
        } else if let Some(channel) = line.strip_prefix("Channel:") {
            if in_protocol.as_deref() == Some("RFCOMM") {
                if let Ok(port) = channel.trim().parse() {
                    record.protocol = "RFCOMM".to_string();
                    record.port = Some(port);
                }
            }
        }
    }
    records.extend(current);
    records
}

/// RFCOMM channel advertised by `address`
pub fn find_rfcomm_port(discovery: &dyn ServiceDiscovery, address: &BdAddr) -> PrintResult<u8> {
    let services = discovery.find_services(address)?;
    if services.is_empty() {
        return Err(PrintError::BluetoothDiscovery(format!(
            "cannot find address: {}",
            address
        )));
    }

    services
        .iter()
        .find(|s| s.host == *address && s.protocol == "RFCOMM")
        .and_then(|s| s.port)
        .ok_or_else(|| {
            PrintError::BluetoothDiscovery(format!(
                "cannot find RFCOMM port for address: {}",
                address
            ))
        })
}

/// Opens RFCOMM streams
pub trait RfcommConnector {
    type Stream: NetStream;

    fn connect(&self, address: &BdAddr, port: u8) -> io::Result<Self::Stream>;
}

/// Kernel RFCOMM sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRfcomm;

#[cfg(target_os = "linux")]
mod socket {
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::time::Duration;

    use super::BdAddr;
    use crate::conn::network::{Interest, NetStream, poll_fd};

    const BTPROTO_RFCOMM: libc::c_int = 3;

    #[repr(C)]
    struct SockaddrRc {
        rc_family: libc::sa_family_t,
        rc_bdaddr: [u8; 6],
        rc_channel: u8,
    }

    #[derive(Debug)]
    pub struct RfcommStream(OwnedFd);

    pub fn connect(address: &BdAddr, port: u8) -> io::Result<RfcommStream> {
        // SAFETY: plain socket(2) call; the result is checked below
        let fd = unsafe {
            libc::socket(
                libc::AF_BLUETOOTH,
                libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
                BTPROTO_RFCOMM,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` is a freshly created descriptor owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let addr = SockaddrRc {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: address.to_le_bytes(),
            rc_channel: port,
        };
        // SAFETY: `addr` outlives the call and the length matches its type
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                &addr as *const SockaddrRc as *const libc::sockaddr,
                mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(RfcommStream(fd))
    }

    impl NetStream for RfcommStream {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            // SAFETY: `buf` is valid for `buf.len()` bytes
            let n = unsafe {
                libc::send(
                    self.0.as_raw_fd(),
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    libc::MSG_NOSIGNAL,
                )
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes
            let n = unsafe {
                libc::recv(
                    self.0.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }

        fn poll_ready(&self, interest: Interest, timeout: Duration) -> io::Result<bool> {
            poll_fd(self.0.as_raw_fd(), interest, timeout)
        }

        fn shutdown(&mut self) -> io::Result<()> {
            // SAFETY: the descriptor is open for the lifetime of `self`
            if unsafe { libc::shutdown(self.0.as_raw_fd(), libc::SHUT_RDWR) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
pub use socket::RfcommStream;

#[cfg(target_os = "linux")]
impl RfcommConnector for SystemRfcomm {
    type Stream = RfcommStream;

    fn connect(&self, address: &BdAddr, port: u8) -> io::Result<RfcommStream> {
        socket::connect(address, port)
    }
}

/// RFCOMM sockets are only wired up on Linux
#[cfg(not(target_os = "linux"))]
#[derive(Debug)]
pub struct RfcommStream {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "RFCOMM sockets are not supported on this platform",
    )
}

#[cfg(not(target_os = "linux"))]
impl NetStream for RfcommStream {
    fn send(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    fn recv(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    fn poll_ready(&self, _: Interest, _: Duration) -> io::Result<bool> {
        Err(unsupported())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl RfcommConnector for SystemRfcomm {
    type Stream = RfcommStream;

    fn connect(&self, _: &BdAddr, _: u8) -> io::Result<RfcommStream> {
        Err(unsupported())
    }
}

pub struct BluetoothConnection<R: RfcommConnector = SystemRfcomm> {
    address: BdAddr,
    port: u8,
    connector: R,
    policy: RetryPolicy,
    stream: Option<R::Stream>,
    read_timeout: Duration,
}

impl BluetoothConnection<SystemRfcomm> {
    /// Parse the settings, discovering the port through `sdptool` when absent
    pub fn create(settings: &str, policy: RetryPolicy) -> PrintResult<Self> {
        Self::create_with_discovery(settings, policy, &SdpTool::default())
    }

    pub fn create_with_discovery(
        settings: &str,
        policy: RetryPolicy,
        discovery: &dyn ServiceDiscovery,
    ) -> PrintResult<Self> {
        let (address, port) = match settings.rsplit_once('/') {
            Some((address, port)) => {
                let address: BdAddr = address.trim().parse()?;
                let port = port.trim().parse::<u8>().map_err(|_| {
                    PrintError::InvalidConfig(format!("Invalid settings: {}", settings))
                })?;
                (address, port)
            }
            None => {
                let address: BdAddr = settings.trim().parse()?;
                (address, find_rfcomm_port(discovery, &address)?)
            }
        };
        Ok(Self::new(address, port, policy))
    }

    pub fn new(address: BdAddr, port: u8, policy: RetryPolicy) -> Self {
        Self::with_connector(address, port, policy, SystemRfcomm)
    }
}

impl<R: RfcommConnector> BluetoothConnection<R> {
    pub fn with_connector(address: BdAddr, port: u8, policy: RetryPolicy, connector: R) -> Self {
        Self {
            address,
            port,
            connector,
            policy,
            stream: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn address(&self) -> BdAddr {
        self.address
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    fn raw_catch(&mut self) -> PrintResult<()> {
        self.raw_release();
        let stream = self.connector.connect(&self.address, self.port)?;
        self.stream = Some(stream);
        debug!(address = %self.address, port = self.port, "rfcomm connected");
        Ok(())
    }

    fn raw_release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown() {
                debug!(error = %e, "rfcomm shutdown failed");
            }
        }
    }

    fn raw_write(&mut self, data: &[u8]) -> PrintResult<()> {
        let mut total = 0;
        while total < data.len() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(PrintError::NotWritable(format!(
                    "rfcomm {}/{} is not connected",
                    self.address, self.port
                )));
            };
            let sent = stream.send(&data[total..])?;
            if sent == 0 {
                return Err(PrintError::Broken(format!(
                    "socket connection broken (address={}, port={})",
                    self.address, self.port
                )));
            }
            total += sent;
        }
        Ok(())
    }

    fn raw_read(&mut self) -> PrintResult<Vec<u8>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Vec::new());
        };
        if !stream.poll_ready(Interest::Readable, self.read_timeout)? {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; READ_BUFSIZE];
        let n = stream.recv(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl<R: RfcommConnector> Connection for BluetoothConnection<R> {
    #[instrument(skip(self), fields(address = %self.address, port = self.port))]
    fn catch(&mut self) -> PrintResult<()> {
        let policy = self.policy;
        Backoff::new(&policy)
            .retry_if(PrintError::is_transient)
            .run(self, |conn| conn.raw_catch())
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("write {} bytes:\n{}", data.len(), hexdump(data));
        }
        let policy = self.policy;
        Backoff::new(&policy)
            .retry_if(PrintError::is_transient)
            .before_delay(|conn: &mut Self, e: &PrintError| {
                if e.needs_reconnect() {
                    conn.raw_release();
                }
            })
            .after_delay(|conn: &mut Self, e: &PrintError| {
                // a failed reconnect leaves no stream; keep trying on later rounds
                if e.needs_reconnect() || conn.stream.is_none() {
                    if let Err(err) = conn.raw_catch() {
                        warn!(error = %err, "rfcomm reconnect failed");
                    }
                }
            })
            .run(self, |conn| conn.raw_write(data))
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        match self.raw_read() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(error = %e, "read error");
                Ok(Vec::new())
            }
        }
    }

    fn release(&mut self) -> PrintResult<()> {
        self.raw_release();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl<R: RfcommConnector> Drop for BluetoothConnection<R> {
    fn drop(&mut self) {
        self.raw_release();
    }
}
