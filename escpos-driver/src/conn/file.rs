//! Raw file or device node connection (e.g. `/dev/usb/lp0`)

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;

pub struct FileConnection {
    path: PathBuf,
    auto_flush: bool,
    writer: Option<BufWriter<File>>,
}

impl FileConnection {
    /// Unopened connection to `path`, flushing after every write
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            auto_flush: true,
            writer: None,
        }
    }

    /// Keep bytes buffered until `flush()` or `release()`
    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> PrintResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Connection for FileConnection {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn catch(&mut self) -> PrintResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                PrintError::Connection(format!("cannot open {}: {}", self.path.display(), e))
            })?;
        self.writer = Some(BufWriter::new(file));
        debug!("file connection opened");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PrintError::NotWritable(self.path.display().to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("write {} bytes:\n{}", data.len(), hexdump(data));
        }
        writer.write_all(data)?;
        if self.auto_flush {
            writer.flush()?;
        }
        Ok(())
    }

    /// Device nodes opened for writing have nothing to read back
    fn read(&mut self) -> PrintResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn release(&mut self) -> PrintResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "file connection closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl std::fmt::Debug for FileConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConnection")
            .field("path", &self.path)
            .field("auto_flush", &self.auto_flush)
            .field("open", &self.is_open())
            .finish()
    }
}
