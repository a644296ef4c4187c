//! CUPS queue connection
//!
//! Bytes are spooled into a temporary file; `release()` submits the file to
//! the remote queue with `lp -h <host> -d <queue> <file>`.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;

pub const DEFAULT_SUBMIT_COMMAND: &str = "lp";

#[derive(Debug)]
pub struct CupsConnection {
    host: String,
    queue: String,
    submit_command: String,
    spool: Option<NamedTempFile>,
    pending: usize,
}

impl CupsConnection {
    /// Parse `"<host>,<queue>"`
    pub fn create(settings: &str) -> PrintResult<Self> {
        let (host, queue) = settings
            .split_once(',')
            .map(|(h, q)| (h.trim(), q.trim()))
            .filter(|(h, q)| !h.is_empty() && !q.is_empty())
            .ok_or_else(|| {
                PrintError::InvalidConfig(format!(
                    "CUPS settings must be '<host>,<queue>'; got '{}'",
                    settings
                ))
            })?;
        Ok(Self::new(host, queue))
    }

    pub fn new(host: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            queue: queue.into(),
            submit_command: DEFAULT_SUBMIT_COMMAND.to_string(),
            spool: None,
            pending: 0,
        }
    }

    /// Program invoked as `<command> -h <host> -d <queue> <file>`
    pub fn with_submit_command(mut self, command: impl Into<String>) -> Self {
        self.submit_command = command.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn submit(&mut self) -> PrintResult<()> {
        let Some(spool) = self.spool.as_mut() else {
            return Ok(());
        };
        if self.pending == 0 {
            return Ok(());
        }
        spool.flush()?;

        let status = Command::new(&self.submit_command)
            .arg("-h")
            .arg(&self.host)
            .arg("-d")
            .arg(&self.queue)
            .arg(spool.path())
            .status()
            .map_err(|e| {
                PrintError::Connection(format!("cannot run {}: {}", self.submit_command, e))
            })?;

        if !status.success() {
            return Err(PrintError::Connection(format!(
                "{} -h {} -d {} exited with {}",
                self.submit_command, self.host, self.queue, status
            )));
        }

        info!(host = %self.host, queue = %self.queue, bytes = self.pending, "job submitted");
        self.pending = 0;
        Ok(())
    }
}

impl Connection for CupsConnection {
    #[instrument(skip(self), fields(host = %self.host, queue = %self.queue))]
    fn catch(&mut self) -> PrintResult<()> {
        if self.spool.is_none() {
            let spool = tempfile::Builder::new()
                .prefix("escpos-")
                .suffix(".prn")
                .tempfile()
                .map_err(|e| PrintError::Connection(format!("cannot create spool file: {}", e)))?;
            debug!(path = %spool.path().display(), "spool file created");
            self.spool = Some(spool);
            self.pending = 0;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| PrintError::NotWritable(format!("{},{}", self.host, self.queue)))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("spool {} bytes:\n{}", data.len(), hexdump(data));
        }
        spool.write_all(data)?;
        self.pending += data.len();
        Ok(())
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Submit pending bytes, then drop the spool file
    fn release(&mut self) -> PrintResult<()> {
        let result = self.submit();
        self.spool = None;
        self.pending = 0;
        result
    }

    fn is_open(&self) -> bool {
        self.spool.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let conn = CupsConnection::create("localhost, receipt").unwrap();
        assert_eq!(conn.host(), "localhost");
        assert_eq!(conn.queue(), "receipt");

        for bad in ["localhost", ",receipt", "localhost,", ""] {
            assert!(matches!(
                CupsConnection::create(bad),
                Err(PrintError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_release_without_data_does_not_submit() {
        let mut conn = CupsConnection::new("localhost", "receipt")
            .with_submit_command("/nonexistent/lp");
        conn.catch().unwrap();
        conn.release().unwrap();
        conn.release().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_release_submits_pending_bytes() {
        let mut conn = CupsConnection::new("localhost", "receipt").with_submit_command("true");
        conn.catch().unwrap();
        conn.write(b"\x1B\x40hello").unwrap();
        conn.release().unwrap();
        assert!(!conn.is_open());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_submission_is_an_error() {
        let mut conn = CupsConnection::new("localhost", "receipt").with_submit_command("false");
        conn.catch().unwrap();
        conn.write(b"x").unwrap();
        assert!(matches!(conn.release(), Err(PrintError::Connection(_))));
        assert!(!conn.is_open());
    }
}
