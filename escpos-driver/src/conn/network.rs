//! Network printers (raw TCP, usually port 9100)
//!
//! Every write and read waits for socket readiness first. When the socket is
//! not ready within the readiness timeout, the connection is dropped and
//! established again once before giving up. Broken, reset and unconnected
//! sockets are reconnected around the backoff sleep.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;
use crate::retry::{Backoff, RetryPolicy};

pub const DEFAULT_READ_BUFSIZE: usize = 4096;
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness interest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// Byte stream under a [`NetworkConnection`]
pub trait NetStream {
    /// Send some prefix of `buf`, returning how many bytes were taken
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for the stream to become ready
    fn poll_ready(&self, interest: Interest, timeout: Duration) -> io::Result<bool>;

    fn shutdown(&mut self) -> io::Result<()>;
}

/// `poll(2)` a single descriptor; errors and hangups count as ready so the
/// following send or recv reports them.
#[cfg(unix)]
pub(crate) fn poll_fd(
    fd: std::os::unix::io::RawFd,
    interest: Interest,
    timeout: Duration,
) -> io::Result<bool> {
    let events = match interest {
        Interest::Readable => libc::POLLIN,
        Interest::Writable => libc::POLLOUT,
    };
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: `pfd` is a valid pollfd for the duration of the call
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0 && pfd.revents != 0)
}

/// Opens [`NetStream`]s
pub trait Connector {
    type Stream: NetStream;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Plain TCP with Nagle's algorithm disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}:{}", host, port),
            )
        }))
    }
}

impl NetStream for TcpStream {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    #[cfg(unix)]
    fn poll_ready(&self, interest: Interest, timeout: Duration) -> io::Result<bool> {
        use std::os::unix::io::AsRawFd;

        poll_fd(self.as_raw_fd(), interest, timeout)
    }

    #[cfg(not(unix))]
    fn poll_ready(&self, interest: Interest, timeout: Duration) -> io::Result<bool> {
        match interest {
            Interest::Writable => Ok(true),
            Interest::Readable => {
                self.set_read_timeout(Some(timeout))?;
                let mut probe = [0u8; 1];
                match self.peek(&mut probe) {
                    Ok(_) => Ok(true),
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Resilient TCP/IP printer connection
pub struct NetworkConnection<C: Connector = TcpConnector> {
    host: String,
    port: u16,
    connector: C,
    policy: RetryPolicy,
    stream: Option<C::Stream>,
    select_timeout: Duration,
    connect_timeout: Duration,
    read_buffer_size: usize,
}

impl NetworkConnection<TcpConnector> {
    /// Parse `"<host>:<port>"`; IPv6 hosts may be bracketed
    pub fn create(settings: &str, policy: RetryPolicy) -> PrintResult<Self> {
        let (host, port) = settings.rsplit_once(':').ok_or_else(|| {
            PrintError::InvalidConfig(format!(
                "network settings must be '<host>:<port>'; got '{}'",
                settings
            ))
        })?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid port: {}", port)))?;
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(PrintError::InvalidConfig(format!(
                "Invalid address: {}",
                settings
            )));
        }
        Ok(Self::new(host, port, policy))
    }

    pub fn new(host: &str, port: u16, policy: RetryPolicy) -> Self {
        Self::with_connector(host, port, policy, TcpConnector)
    }
}

impl<C: Connector> NetworkConnection<C> {
    pub fn with_connector(host: &str, port: u16, policy: RetryPolicy, connector: C) -> Self {
        Self {
            host: host.to_string(),
            port,
            connector,
            policy,
            stream: None,
            select_timeout: DEFAULT_SELECT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFSIZE,
        }
    }

    /// Readiness wait before every write and read
    pub fn with_select_timeout(mut self, timeout: Duration) -> Self {
        self.select_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Try a fresh connection without touching the current one
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub fn probe(&self, timeout: Duration) -> bool {
        match self.connector.connect(&self.host, self.port, timeout) {
            Ok(_) => {
                info!("Printer online");
                true
            }
            Err(e) => {
                warn!(error = %e, "Printer offline");
                false
            }
        }
    }

    fn details(&self, message: &str) -> String {
        format!(
            "{} (host={}, port={}, connected={})",
            message,
            self.host,
            self.port,
            self.stream.is_some()
        )
    }

    fn raw_catch(&mut self) -> PrintResult<()> {
        let stream = self
            .connector
            .connect(&self.host, self.port, self.connect_timeout)?;
        self.stream = Some(stream);
        debug!(host = %self.host, port = self.port, "connected");
        Ok(())
    }

    fn raw_release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown() {
                debug!(error = %e, "socket shutdown failed");
            }
            debug!(host = %self.host, port = self.port, "disconnected");
        }
    }

    fn reconnect(&mut self) -> PrintResult<()> {
        self.raw_release();
        self.raw_catch()
    }

    /// Wait for readiness, reconnecting once if the socket stays idle
    fn assert_ready(&mut self, interest: Interest) -> PrintResult<()> {
        if self.stream.is_none() {
            self.reconnect()?;
        }

        for _ in 0..2 {
            let ready = match self.stream.as_ref() {
                Some(stream) => stream.poll_ready(interest, self.select_timeout)?,
                None => false,
            };
            if ready {
                return Ok(());
            }
            self.reconnect()?;
        }

        Err(match interest {
            Interest::Writable => PrintError::NotWritable(self.details("cannot write to socket")),
            Interest::Readable => PrintError::NotReadable(self.details("cannot read from socket")),
        })
    }

    fn raw_write(&mut self, data: &[u8]) -> PrintResult<()> {
        self.assert_ready(Interest::Writable)?;

        let mut total = 0;
        while total < data.len() {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Err(PrintError::NotWritable(self.details("socket closed"))),
            };
            let sent = stream.send(&data[total..])?;
            if sent == 0 {
                return Err(PrintError::Broken(self.details("socket connection broken")));
            }
            total += sent;
        }
        Ok(())
    }

    fn raw_read(&mut self) -> PrintResult<Vec<u8>> {
        self.assert_ready(Interest::Readable)?;
        let mut buf = vec![0u8; self.read_buffer_size];
        let n = match self.stream.as_mut() {
            Some(stream) => stream.recv(&mut buf)?,
            None => 0,
        };
        buf.truncate(n);
        Ok(buf)
    }

    fn with_retry<R>(
        &mut self,
        op: impl FnMut(&mut Self) -> PrintResult<R>,
    ) -> PrintResult<R> {
        let policy = self.policy;
        Backoff::new(&policy)
            .retry_if(PrintError::is_transient)
            .before_delay(|conn: &mut Self, e: &PrintError| {
                if e.needs_reconnect() {
                    conn.raw_release();
                }
            })
            .after_delay(|conn: &mut Self, e: &PrintError| {
                if e.needs_reconnect() {
                    if let Err(err) = conn.raw_catch() {
                        warn!(error = %err, "reconnect failed");
                    }
                }
            })
            .run(self, op)
    }
}

impl<C: Connector> Connection for NetworkConnection<C> {
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    fn catch(&mut self) -> PrintResult<()> {
        self.with_retry(|conn| {
            conn.raw_release();
            conn.raw_catch()
        })
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("write {} bytes:\n{}", data.len(), hexdump(data));
        }
        self.with_retry(|conn| conn.raw_write(data))
    }

    /// Best effort; any failure reads as "nothing pending"
    fn read(&mut self) -> PrintResult<Vec<u8>> {
        match self.raw_read() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                debug!(error = %e, "nothing read");
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

impl<C: Connector> Drop for NetworkConnection<C> {
    fn drop(&mut self) {
        self.raw_release();
    }
}
