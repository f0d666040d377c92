//! Byte-level transport abstraction
//!
//! The serial-attached EC2 and the USB-attached EC3 move the same command
//! bytes; only framing, control lines and shutdown differ. Implementations
//! live in the `ec2-serial` and `ec2-usb` crates.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// Kind of debug adapter on the other end of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Serial-attached adapter (EC2)
    Serial,
    /// USB-attached adapter (EC3)
    Usb,
}

impl AdapterKind {
    /// Short product name used in log messages
    pub fn name(&self) -> &'static str {
        match self {
            AdapterKind::Serial => "EC2",
            AdapterKind::Usb => "EC3",
        }
    }

    /// Inclusive `[min, max-tested]` application firmware window
    pub fn firmware_window(&self) -> (u8, u8) {
        match self {
            AdapterKind::Serial => (0x13, 0x13),
            AdapterKind::Usb => (0x07, 0x0a),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed port identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// Serial device path, e.g. `/dev/ttyS0`
    Serial(String),
    /// USB adapter, optionally selected by its serial-number string
    Usb {
        /// Serial number to match, or `None` for the first adapter found
        serial: Option<String>,
    },
}

impl PortSpec {
    /// Parse a port identifier
    ///
    /// Formats:
    /// - `USB` - first USB adapter
    /// - `USB:<serial>` - USB adapter with the given serial number
    /// - anything else - path to a serial device
    pub fn parse(port: &str) -> Result<Self> {
        match port.strip_prefix("USB") {
            Some("") => Ok(PortSpec::Usb { serial: None }),
            Some(rest) => match rest.strip_prefix(':') {
                Some(serial) if !serial.is_empty() => Ok(PortSpec::Usb {
                    serial: Some(serial.to_string()),
                }),
                _ => Err(Error::InvalidPort(port.to_string())),
            },
            None if port.is_empty() => Err(Error::InvalidPort(port.to_string())),
            None => Ok(PortSpec::Serial(port.to_string())),
        }
    }

    /// Adapter kind implied by this port
    pub fn adapter(&self) -> AdapterKind {
        match self {
            PortSpec::Serial(_) => AdapterKind::Serial,
            PortSpec::Usb { .. } => AdapterKind::Usb,
        }
    }
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PortSpec::parse(s)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Serial(path) => f.write_str(path),
            PortSpec::Usb { serial: None } => f.write_str("USB"),
            PortSpec::Usb { serial: Some(s) } => write!(f, "USB:{}", s),
        }
    }
}

/// Transport trait for reading and writing adapter bytes
pub trait Transport: Send {
    /// Kind of adapter this transport talks to
    fn adapter(&self) -> AdapterKind;

    /// Write bytes to the adapter
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes
    ///
    /// Fails with [`Error::Timeout`] if the adapter stays silent for the
    /// transport's fixed window.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Discard any unread input
    fn flush_input(&mut self) -> Result<()>;

    /// Discard any unsent output
    fn flush_output(&mut self) -> Result<()>;

    /// Hardware-reset the adapter into its boot-loader
    fn reset_adapter(&mut self) -> Result<()>;

    /// Largest payload a single `write` may carry
    fn max_payload(&self) -> usize {
        usize::MAX
    }

    /// Release the adapter
    ///
    /// Called exactly once by the session on disconnect.
    fn close(&mut self) -> Result<()>;

    /// Write a single byte
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Read a single byte
    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8];
        self.read(&mut buf)?;
        Ok(buf[0])
    }
}

/// Opens transports for port identifiers
///
/// The session reopens the adapter through this when the automatic mode
/// probe has to start over.
pub trait Connector {
    /// Open the adapter named by `port`
    fn open(&self, port: &PortSpec) -> Result<Box<dyn Transport>>;
}
