//! Printer front end
//!
//! [`Printer`] owns a [`Connection`] and a [`Model`]. It is caught on
//! construction and every operation writes the model's bytes for that
//! operation straight to the connection, in call order.
//!
//! ```ignore
//! let conn = NetworkConnection::create("192.168.0.100:9100", RetryPolicy::default())?;
//! let mut printer = Printer::new(conn, ModelId::EpsonTmT20.model())?;
//! printer.init()?;
//! printer.text_center("Hello World!")?;
//! printer.cut(true)?;
//! printer.release()?;
//! ```

use std::thread;
use std::time::Duration;

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, instrument};

use crate::barcode::{BarcodeCommand, BarcodeOptions, Code128, Ean8, Ean13, QrCodeOptions};
use crate::command::{self, Justify};
use crate::conn::Connection;
use crate::encoding::{
    EncodingErrors, encode_text, encoded_width, pad_to_width, truncate_to_width,
};
use crate::error::{PrintError, PrintResult};
use crate::model::Model;
use crate::vendor::DrawerPulse;

pub struct Printer<C: Connection> {
    conn: C,
    model: Model,
    encoding: &'static Encoding,
    errors: EncodingErrors,
    settle: Option<Duration>,
}

impl<C: Connection> Printer<C> {
    /// Catch `conn` and bind it to `model`; text is encoded as UTF-8 until
    /// [`Printer::with_encoding`] says otherwise.
    pub fn new(mut conn: C, model: Model) -> PrintResult<Self> {
        conn.catch()?;
        Ok(Self {
            conn,
            model,
            encoding: UTF_8,
            errors: EncodingErrors::Strict,
            settle: None,
        })
    }

    /// Byte encoding matching the code page selected on the device
    pub fn with_encoding(mut self, encoding: &'static Encoding, errors: EncodingErrors) -> Self {
        self.encoding = encoding;
        self.errors = errors;
        self
    }

    /// Wait between a barcode write and its read; `None` restores each
    /// encoder's own settle time.
    pub fn set_settle_time(&mut self, settle: Option<Duration>) {
        self.settle = settle;
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    pub fn release(&mut self) -> PrintResult<()> {
        self.conn.release()
    }

    /// `ESC @`
    pub fn init(&mut self) -> PrintResult<()> {
        self.conn.write(&command::init())
    }

    pub fn lf(&mut self, lines: usize) -> PrintResult<()> {
        if lines == 0 {
            return Ok(());
        }
        self.conn.write(&command::line_feed(lines))
    }

    /// Write text as is
    pub fn textout(&mut self, text: &str) -> PrintResult<()> {
        let bytes = encode_text(text, self.encoding, self.errors)?;
        self.conn.write(&bytes)
    }

    /// Write text followed by a line feed
    pub fn text(&mut self, text: &str) -> PrintResult<()> {
        self.textout(text)?;
        self.lf(1)
    }

    pub fn text_center(&mut self, text: &str) -> PrintResult<()> {
        self.justify_center()?;
        self.text(text)
    }

    /// `left` and `right` on one line, padded to the normal column count
    pub fn text_lr(&mut self, left: &str, right: &str) -> PrintResult<()> {
        let columns = self.model.features.columns.normal;
        let right = truncate_to_width(right, columns, self.encoding);
        let right_width = encoded_width(&right, self.encoding);
        let left = pad_to_width(left, columns - right_width, false, self.encoding);
        self.text(&format!("{}{}", left, right))
    }

    pub fn justify_left(&mut self) -> PrintResult<()> {
        self.justify(Justify::Left)
    }

    pub fn justify_center(&mut self) -> PrintResult<()> {
        self.justify(Justify::Center)
    }

    pub fn justify_right(&mut self) -> PrintResult<()> {
        self.justify(Justify::Right)
    }

    fn justify(&mut self, justify: Justify) -> PrintResult<()> {
        let bytes = self.model.text.justify(justify);
        self.conn.write(&bytes)
    }

    pub fn set_expanded(&mut self, on: bool) -> PrintResult<()> {
        let bytes = self.model.text.expanded(on)?;
        self.conn.write(&bytes)
    }

    pub fn set_condensed(&mut self, on: bool) -> PrintResult<()> {
        let bytes = self.model.text.condensed(on)?;
        self.conn.write(&bytes)
    }

    pub fn set_emphasized(&mut self, on: bool) -> PrintResult<()> {
        let bytes = self.model.text.emphasized(on);
        self.conn.write(&bytes)
    }

    /// Character magnification, 0 (normal) to 7 (8 times) on each axis
    pub fn set_text_size(&mut self, width: u8, height: u8) -> PrintResult<()> {
        let bytes = self.model.text.text_size(width, height)?;
        self.conn.write(&bytes)
    }

    /// `ESC t n`
    pub fn set_code_page(&mut self, page: u8) -> PrintResult<()> {
        self.conn.write(&command::code_page(page))
    }

    /// Cut the paper; does nothing on printers without a cutter
    pub fn cut(&mut self, partial: bool) -> PrintResult<()> {
        if !self.model.features.cutter {
            debug!(model = %self.model.info, "no cutter; cut skipped");
            return Ok(());
        }
        let bytes = self.model.cutter.cut(partial);
        self.conn.write(&bytes)
    }

    /// Pulse a cash drawer port
    ///
    /// Does nothing when the model has no drawer ports at all. A port past
    /// the available ones is a [`PrintError::CashDrawer`].
    #[instrument(skip(self, pulse), fields(model = %self.model.info))]
    pub fn kick_drawer(&mut self, port: u8, pulse: &DrawerPulse) -> PrintResult<()> {
        let features = self.model.features;
        if !features.cashdrawer_ports {
            debug!("no cash drawer ports; kick skipped");
            return Ok(());
        }

        let available = features.cashdrawer_available_ports;
        if port >= available {
            let ports = (0..available)
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PrintError::CashDrawer(format!(
                "invalid cash drawer port: {} (available ports are: {})",
                port, ports
            )));
        }

        let bytes = self.model.drawer.kick(port, pulse)?;
        self.conn.write(&bytes)
    }

    pub fn ean13(&mut self, data: &str, options: &BarcodeOptions) -> PrintResult<Vec<u8>> {
        let code = Ean13::new(data)?;
        let command = self.model.barcodes.ean13(&code, options)?;
        self.barcode(command)
    }

    pub fn ean8(&mut self, data: &str, options: &BarcodeOptions) -> PrintResult<Vec<u8>> {
        let code = Ean8::new(data)?;
        let command = self.model.barcodes.ean8(&code, options)?;
        self.barcode(command)
    }

    pub fn code128(&mut self, data: &str, options: &BarcodeOptions) -> PrintResult<Vec<u8>> {
        let code = Code128::new(data)?;
        let command = self.model.barcodes.code128(&code, options)?;
        self.barcode(command)
    }

    /// QR code of `data` encoded with the printer encoding
    pub fn qrcode(&mut self, data: &str, options: &QrCodeOptions) -> PrintResult<Vec<u8>> {
        let bytes = encode_text(data, self.encoding, self.errors)?;
        let command = self.model.barcodes.qrcode(&bytes, options)?;
        self.barcode(command)
    }

    /// Write the whole command, wait for the symbol to print, then read
    /// whatever the printer answered
    fn barcode(&mut self, command: BarcodeCommand) -> PrintResult<Vec<u8>> {
        self.conn.write(&command.sequence.to_bytes())?;
        let settle = self.settle.unwrap_or(command.settle);
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        self.conn.read()
    }
}
