//! Windows spooler printers (RAW datatype)
//!
//! `catch()` opens the printer and starts a RAW document and page; bytes go
//! straight through `WritePrinter`; `release()` ends the job.

use core::ffi::c_void;

use tracing::{debug, info, instrument};
use windows::Win32::Graphics::Printing::{
    ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, EnumPrintersW, GetDefaultPrinterW,
    OpenPrinterW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_HANDLE, PRINTER_INFO_5W,
    StartDocPrinterW, StartPagePrinter, WritePrinter,
};
use windows::core::{PCWSTR, PWSTR};

use super::Connection;
use crate::error::{PrintError, PrintResult};
use crate::hexdump::hexdump;

const DOC_NAME: &str = "ESC/POS Document";

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Virtual printer ports that never reach a device
fn is_virtual_port(port: &str) -> bool {
    let p = port.to_lowercase();
    p == "file:"
        || p == "portprompt:"
        || p == "xpsport:"
        || p.starts_with("onenote")
        || p == "nul:"
        || p.starts_with("wfsport:")
}

pub struct Win32RawConnection {
    name: String,
    handle: Option<PRINTER_HANDLE>,
}

impl Win32RawConnection {
    /// An empty name resolves to the default printer on `catch()`
    pub fn create(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installed printers, without virtual ones
    pub fn list() -> PrintResult<Vec<String>> {
        unsafe {
            let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;

            let _ = EnumPrintersW(flags, None, 5, None, &mut needed, &mut returned);

            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                None,
                5,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|_| PrintError::WindowsPrinter("EnumPrintersW failed".to_string()))?;

            let ptr = buf.as_ptr() as *const PRINTER_INFO_5W;
            let slice = std::slice::from_raw_parts(ptr, returned as usize);

            let mut result = Vec::new();
            for info in slice {
                if info.pPrinterName.is_null() {
                    continue;
                }
                let name = PWSTR(info.pPrinterName.0).to_string().unwrap_or_default();
                let port = if info.pPortName.is_null() {
                    String::new()
                } else {
                    PWSTR(info.pPortName.0).to_string().unwrap_or_default()
                };
                if !is_virtual_port(&port) {
                    result.push(name);
                }
            }
            Ok(result)
        }
    }

    pub fn default_printer() -> PrintResult<Option<String>> {
        unsafe {
            let mut needed: u32 = 0;
            let _ = GetDefaultPrinterW(None, &mut needed);

            if needed == 0 {
                return Ok(None);
            }

            let mut buf: Vec<u16> = vec![0; needed as usize];
            let ok = GetDefaultPrinterW(Some(PWSTR(buf.as_mut_ptr())), &mut needed);
            if !ok.as_bool() {
                return Ok(None);
            }

            let name = PWSTR(buf.as_mut_ptr())
                .to_string()
                .map_err(|e| PrintError::WindowsPrinter(format!("UTF-16 decode failed: {}", e)))?;
            Ok(Some(name))
        }
    }

    fn resolve_name(&self) -> PrintResult<String> {
        if !self.name.is_empty() {
            return Ok(self.name.clone());
        }
        Self::default_printer()?
            .ok_or_else(|| PrintError::Connection("No default printer".to_string()))
    }

    /// Close the job and the printer; failures past this point are ignored
    fn close(handle: PRINTER_HANDLE) {
        unsafe {
            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);
        }
    }
}

impl Connection for Win32RawConnection {
    #[instrument(skip(self), fields(printer = %self.name))]
    fn catch(&mut self) -> PrintResult<()> {
        if let Some(handle) = self.handle.take() {
            Self::close(handle);
        }
        let name = self.resolve_name()?;
        let name_w = to_wide(&name);

        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None).map_err(|_| {
                PrintError::Connection(format!("OpenPrinterW failed for {}", name))
            })?;

            let doc_name_w = to_wide(DOC_NAME);
            let datatype_w = to_wide("RAW");
            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter(
                    "StartDocPrinter failed".to_string(),
                ));
            }

            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter(
                    "StartPagePrinter failed".to_string(),
                ));
            }

            self.handle = Some(handle);
        }
        info!(printer = %name, "raw job started");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let handle = self
            .handle
            .ok_or_else(|| PrintError::NotWritable(format!("printer {} is not open", self.name)))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("write {} bytes:\n{}", data.len(), hexdump(data));
        }

        let mut written: u32 = 0;
        let ok = unsafe {
            WritePrinter(
                handle,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            )
        };
        if !ok.as_bool() {
            return Err(PrintError::WindowsPrinter("WritePrinter failed".to_string()));
        }
        if written != data.len() as u32 {
            return Err(PrintError::WindowsPrinter("Incomplete write".to_string()));
        }
        Ok(())
    }

    fn read(&mut self) -> PrintResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn release(&mut self) -> PrintResult<()> {
        if let Some(handle) = self.handle.take() {
            Self::close(handle);
            debug!(printer = %self.name, "raw job closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Win32RawConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            Self::close(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_ports() {
        assert!(is_virtual_port("FILE:"));
        assert!(is_virtual_port("OneNote (Desktop)"));
        assert!(is_virtual_port("nul:"));
        assert!(!is_virtual_port("USB001"));
        assert!(!is_virtual_port("IP_192.168.1.100"));
    }

    #[test]
    fn test_write_before_catch() {
        let mut conn = Win32RawConnection::create("EPSON TM-T20");
        assert_eq!(conn.name(), "EPSON TM-T20");
        assert!(matches!(conn.write(b"x"), Err(PrintError::NotWritable(_))));
        assert!(conn.read().unwrap().is_empty());
        conn.release().unwrap();
    }
}
