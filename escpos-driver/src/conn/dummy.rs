//! In-memory connection for tests and dry runs

use std::collections::VecDeque;

use super::Connection;
use crate::error::PrintResult;

/// Accumulates written bytes and never fails
#[derive(Debug, Default)]
pub struct DummyConnection {
    output: Vec<u8>,
    responses: VecDeque<Vec<u8>>,
    open: bool,
}

impl DummyConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drain the written bytes
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Queue bytes for the next `read()`
    pub fn push_response(&mut self, bytes: impl Into<Vec<u8>>) {
        self.responses.push_back(bytes.into());
    }
}

impl Connection for DummyConnection {
    fn catch(&mut self) -> PrintResult<()> {
        self.open = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        self.output.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn release(&mut self) -> PrintResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_and_drains() {
        let mut conn = DummyConnection::new();
        conn.catch().unwrap();
        conn.write(b"\x1B\x40").unwrap();
        conn.write(b"hi").unwrap();
        assert_eq!(conn.output(), b"\x1B\x40hi");
        assert_eq!(conn.take_output(), b"\x1B\x40hi");
        assert!(conn.output().is_empty());
    }

    #[test]
    fn test_responses_are_read_once() {
        let mut conn = DummyConnection::new();
        conn.push_response(vec![0x12]);
        assert_eq!(conn.read().unwrap(), vec![0x12]);
        assert!(conn.read().unwrap().is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut conn = DummyConnection::new();
        conn.catch().unwrap();
        conn.release().unwrap();
        conn.release().unwrap();
        assert!(!conn.is_open());
    }
}
