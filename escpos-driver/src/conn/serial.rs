//! RS-232 printers
//!
//! Writes go out in 512 byte chunks. Before each chunk the connection polls
//! the hardware readiness line chosen by the flow control protocol (CTS for
//! RTS/CTS, DSR for DSR/DTR) for up to the protocol timeout.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, instrument, warn};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;
use crate::retry::{Backoff, RetryPolicy};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(5);
pub const CHUNK_SIZE: usize = 512;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Standard baud rates
pub const BAUD_RATES: [u32; 30] = [
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000,
    3000000, 3500000, 4000000,
];

/// Flow control protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    RtsCts,
    DsrDtr,
    XonXoff,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::RtsCts => "RTSCTS",
            Protocol::DsrDtr => "DSRDTR",
            Protocol::XonXoff => "XONXOFF",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Protocol::RtsCts => "Hardware RTS/CTS",
            Protocol::DsrDtr => "Hardware DSR/DTR",
            Protocol::XonXoff => "Software XOn/XOff",
        }
    }
}

impl FromStr for Protocol {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RTSCTS" => Ok(Protocol::RtsCts),
            "DSRDTR" => Ok(Protocol::DsrDtr),
            "XONXOFF" => Ok(Protocol::XonXoff),
            _ => Err(PrintError::InvalidConfig(format!("Unknown protocol: {}", s))),
        }
    }
}

/// Port name and line parameters, e.g. `/dev/ttyS0:9600,8,1,N,RTSCTS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baudrate: u32,
    pub databits: u8,
    pub stopbits: u8,
    pub parity: Parity,
    pub protocol: Protocol,
}

impl SerialSettings {
    /// Fields may be separated by commas or colons; the protocol defaults to
    /// RTS/CTS when omitted.
    pub fn parse(value: &str) -> PrintResult<Self> {
        let normalized = value.replace(',', ":");
        let fields: Vec<&str> = normalized.split(':').map(str::trim).collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(PrintError::InvalidConfig(format!(
                "Unknown serial port string format: {} (expecting something like \"COM1:9600,8,1,N,RTSCTS\")",
                value
            )));
        }

        let port = fields[0];
        if port.is_empty() {
            return Err(PrintError::InvalidConfig(format!(
                "Missing serial port name: {}",
                value
            )));
        }

        let baudrate = parse_number::<u32>("baud rate", fields[1])?;
        if !BAUD_RATES.contains(&baudrate) {
            return Err(PrintError::InvalidConfig(format!(
                "Unsupported baud rate value: {}",
                baudrate
            )));
        }

        let databits = parse_number::<u8>("byte size", fields[2])?;
        if !(5..=8).contains(&databits) {
            return Err(PrintError::InvalidConfig(format!(
                "Unsupported byte size value: {}",
                databits
            )));
        }

        let stopbits = parse_number::<u8>("stop bits", fields[3])?;
        if stopbits != 1 && stopbits != 2 {
            return Err(PrintError::InvalidConfig(format!(
                "Unsupported stop bits value: {}",
                stopbits
            )));
        }

        let parity = match fields[4].to_ascii_uppercase().as_str() {
            "N" => Parity::None,
            "E" => Parity::Even,
            "O" => Parity::Odd,
            other => {
                return Err(PrintError::InvalidConfig(format!(
                    "Unsupported parity value: {}",
                    other
                )));
            }
        };

        let protocol = match fields.get(5) {
            Some(p) => p.parse()?,
            None => Protocol::default(),
        };

        Ok(Self {
            port: port.to_string(),
            baudrate,
            databits,
            stopbits,
            parity,
            protocol,
        })
    }

    fn data_bits(&self) -> DataBits {
        match self.databits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> StopBits {
        if self.stopbits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        }
    }

    fn parity_char(&self) -> char {
        match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        }
    }
}

fn parse_number<T: FromStr>(what: &str, value: &str) -> PrintResult<T> {
    value
        .parse()
        .map_err(|_| PrintError::InvalidConfig(format!("Invalid {}: {}", what, value)))
}

impl FromStr for SerialSettings {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{},{},{},{}",
            self.port,
            self.baudrate,
            self.databits,
            self.stopbits,
            self.parity_char(),
            self.protocol.as_str()
        )
    }
}

/// Names of the serial ports present on this system
pub fn scan_ports() -> PrintResult<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// Open serial line
pub trait SerialLink {
    fn send_all(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn flush_output(&mut self) -> io::Result<()>;

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bytes waiting in the input buffer
    fn pending(&mut self) -> PrintResult<u32>;

    fn cts(&mut self) -> PrintResult<bool>;

    fn dsr(&mut self) -> PrintResult<bool>;

    fn set_rts(&mut self, level: bool) -> PrintResult<()>;

    fn set_dtr(&mut self, level: bool) -> PrintResult<()>;

    /// Discard both input and output buffers
    fn purge(&mut self) -> PrintResult<()>;
}

/// Opens [`SerialLink`]s
pub trait SerialOpener {
    type Link: SerialLink;

    fn open(&self, settings: &SerialSettings, timeout: Duration) -> PrintResult<Self::Link>;
}

/// OS serial ports through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

impl SerialOpener for SystemSerial {
    type Link = Box<dyn SerialPort>;

    fn open(&self, settings: &SerialSettings, timeout: Duration) -> PrintResult<Self::Link> {
        let flow_control = match settings.protocol {
            Protocol::RtsCts => FlowControl::Hardware,
            Protocol::DsrDtr | Protocol::XonXoff => FlowControl::None,
        };
        let port = serialport::new(&settings.port, settings.baudrate)
            .data_bits(settings.data_bits())
            .stop_bits(settings.stop_bits())
            .parity(settings.parity)
            .flow_control(flow_control)
            .timeout(timeout)
            .open()?;
        Ok(port)
    }
}

impl SerialLink for Box<dyn SerialPort> {
    fn send_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        Write::write_all(self, chunk)
    }

    fn flush_output(&mut self) -> io::Result<()> {
        Write::flush(self)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn pending(&mut self) -> PrintResult<u32> {
        Ok(self.bytes_to_read()?)
    }

    fn cts(&mut self) -> PrintResult<bool> {
        Ok(self.read_clear_to_send()?)
    }

    fn dsr(&mut self) -> PrintResult<bool> {
        Ok(self.read_data_set_ready()?)
    }

    fn set_rts(&mut self, level: bool) -> PrintResult<()> {
        Ok(self.write_request_to_send(level)?)
    }

    fn set_dtr(&mut self, level: bool) -> PrintResult<()> {
        Ok(self.write_data_terminal_ready(level)?)
    }

    fn purge(&mut self) -> PrintResult<()> {
        Ok(self.clear(ClearBuffer::All)?)
    }
}

pub struct SerialConnection<O: SerialOpener = SystemSerial> {
    settings: SerialSettings,
    opener: O,
    policy: RetryPolicy,
    link: Option<O::Link>,
    timeout: Duration,
    protocol_timeout: Duration,
}

impl SerialConnection<SystemSerial> {
    pub fn create(settings: &str, policy: RetryPolicy) -> PrintResult<Self> {
        Ok(Self::new(SerialSettings::parse(settings)?, policy))
    }

    pub fn new(settings: SerialSettings, policy: RetryPolicy) -> Self {
        Self::with_opener(settings, policy, SystemSerial)
    }
}

impl<O: SerialOpener> SerialConnection<O> {
    pub fn with_opener(settings: SerialSettings, policy: RetryPolicy, opener: O) -> Self {
        Self {
            settings,
            opener,
            policy,
            link: None,
            timeout: DEFAULT_TIMEOUT,
            protocol_timeout: DEFAULT_PROTOCOL_TIMEOUT,
        }
    }

    /// Read and write timeout of the port
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long to wait for the readiness line before each chunk
    pub fn with_protocol_timeout(mut self, timeout: Duration) -> Self {
        self.protocol_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn link(&mut self) -> PrintResult<&mut O::Link> {
        match self.link.as_mut() {
            Some(link) => Ok(link),
            None => Err(PrintError::NotWritable(format!(
                "serial port {} is not open",
                self.settings.port
            ))),
        }
    }

    fn raw_catch(&mut self) -> PrintResult<()> {
        if self.settings.protocol == Protocol::XonXoff {
            return Err(PrintError::InvalidConfig(format!(
                "Serial protocol \"{}\" is not available",
                self.settings.protocol.as_str()
            )));
        }
        self.link = None;

        let mut link = self.opener.open(&self.settings, self.timeout)?;
        link.set_rts(true)?;
        link.set_dtr(true)?;
        link.purge()?;
        self.link = Some(link);
        debug!(port = %self.settings.port, "serial port opened");
        Ok(())
    }

    fn is_clear_to_write(&mut self) -> PrintResult<bool> {
        let protocol = self.settings.protocol;
        let link = self.link()?;
        match protocol {
            Protocol::DsrDtr => link.dsr(),
            _ => link.cts(),
        }
    }

    /// Poll the readiness line; after the protocol timeout the chunk is sent anyway
    fn wait_to_write(&mut self) -> PrintResult<()> {
        let started = Instant::now();
        while started.elapsed() < self.protocol_timeout {
            if self.is_clear_to_write()? {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        warn!(
            port = %self.settings.port,
            protocol = self.settings.protocol.as_str(),
            "printer not ready after protocol timeout; writing anyway"
        );
        Ok(())
    }

    fn raw_write(&mut self, data: &[u8]) -> PrintResult<()> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.wait_to_write()?;
            self.link()?.send_all(chunk)?;
        }
        self.link()?.flush_output()?;
        Ok(())
    }
}

impl<O: SerialOpener> Connection for SerialConnection<O> {
    #[instrument(skip(self), fields(settings = %self.settings))]
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
                    conn.link = None;
                }
            })
            .after_delay(|conn: &mut Self, e: &PrintError| {
                // a failed reopen leaves no link; keep trying on later rounds
                if e.needs_reconnect() || conn.link.is_none() {
                    if let Err(err) = conn.raw_catch() {
                        warn!(error = %err, "serial reopen failed");
                    }
                }
            })
            .run(self, |conn| conn.raw_write(data))
    }

    /// Drain everything currently buffered
    fn read(&mut self) -> PrintResult<Vec<u8>> {
        let mut data = Vec::new();
        let Some(link) = self.link.as_mut() else {
            return Ok(data);
        };
        loop {
            let waiting = link.pending()? as usize;
            if waiting == 0 {
                break;
            }
            let mut buf = vec![0u8; waiting];
            match link.recv(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(data)
    }

    fn release(&mut self) -> PrintResult<()> {
        if self.link.take().is_some() {
            debug!(port = %self.settings.port, "serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }
}
