//! Error types for ec2-core
//!
//! Every failure carries a tagged reason so callers can tell a silent
//! adapter apart from a protocol mismatch or a rejected address range.

use core::fmt;

use thiserror::Error;

/// Target address space an access was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    /// Internal data RAM (0x00-0xFF)
    Ram,
    /// Special function registers (0x80-0xFF)
    Sfr,
    /// External data space (0x0000-0xFFFF)
    Xdata,
    /// Code flash
    Flash,
    /// Flash scratch-pad
    Scratchpad,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ram => write!(f, "RAM"),
            Self::Sfr => write!(f, "SFR"),
            Self::Xdata => write!(f, "XDATA"),
            Self::Flash => write!(f, "flash"),
            Self::Scratchpad => write!(f, "scratch-pad"),
        }
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    // Transport errors
    /// The adapter could not be opened (not found, busy, no permission)
    #[error("failed to open adapter: {0}")]
    TransportOpen(String),

    /// No reply within the transport's fixed window
    #[error("adapter did not reply in time")]
    Timeout,

    /// Low-level I/O failure on an open transport
    #[error("I/O error: {0}")]
    Io(String),

    /// Port identifier is neither a device path, `USB` nor `USB:<serial>`
    #[error("invalid port identifier: {0}")]
    InvalidPort(String),

    // Protocol errors
    /// Reply bytes differ from the expected pattern
    #[error("protocol mismatch: expected {expected:02X?}, received {received:02X?}")]
    ProtocolMismatch {
        /// Bytes the command should have produced
        expected: Vec<u8>,
        /// Bytes actually read back
        received: Vec<u8>,
    },

    /// Adapter firmware is older than the minimum usable version
    #[error("incompatible {adapter} firmware version 0x{version:02X} (need 0x{min:02X}..=0x{max:02X})")]
    VersionIncompatible {
        /// Adapter name ("EC2" or "EC3")
        adapter: &'static str,
        /// Version reported by the adapter
        version: u8,
        /// Minimum usable version
        min: u8,
        /// Highest tested version
        max: u8,
    },

    /// The identification value shows no microcontroller on the debug port
    #[error("debug adapter is not connected to a microcontroller (id 0x{0:04X})")]
    TargetAbsent(u16),

    /// Identified target is not in the device table
    #[error("unknown device: family 0x{family:02X} revision 0x{revision:02X}")]
    UnknownDevice {
        /// Family byte of the identification value
        family: u8,
        /// Revision byte of the identification value
        revision: u8,
    },

    /// Operation requires a connected session
    #[error("not connected to a target")]
    NotConnected,

    // Address errors
    /// Address range lies outside the address space
    #[error("{space} range 0x{start:05X}+{len} is out of bounds")]
    RangeViolation {
        /// Address space of the request
        space: AddressSpace,
        /// First address of the request
        start: u32,
        /// Length of the request in bytes
        len: usize,
    },

    /// Address range intersects the device's reserved flash area
    #[error("flash range 0x{start:05X}+{len} touches the reserved area")]
    ReservedFlash {
        /// First address of the request
        start: u32,
        /// Length of the request in bytes
        len: usize,
    },

    /// Scratch-pad access is not possible on this device or in this mode
    #[error("scratch-pad access is not supported here")]
    ScratchpadUnsupported,

    // Breakpoint errors
    /// All hardware breakpoint slots are in use
    #[error("no free hardware breakpoint slot")]
    BreakpointTableFull,

    /// A breakpoint already exists at the address
    #[error("breakpoint already set at 0x{0:05X}")]
    DuplicateBreakpoint(u32),

    /// No breakpoint is set at the address
    #[error("no breakpoint at 0x{0:05X}")]
    BreakpointNotFound(u32),

    // Adapter firmware errors
    /// Firmware image has the wrong size for this adapter
    #[error("firmware image is {actual} bytes, {adapter} needs {expected}")]
    FirmwareImageSize {
        /// Adapter name
        adapter: &'static str,
        /// Required image length
        expected: usize,
        /// Supplied image length
        actual: usize,
    },

    /// Adapter reported a different block checksum than was written
    #[error("checksum mismatch on firmware block 0x{block:02X}: wrote 0x{expected:04X}, adapter has 0x{actual:04X}")]
    ChecksumMismatch {
        /// Boot-loader flash page
        block: u8,
        /// Checksum of the data sent
        expected: u16,
        /// Checksum reported by the adapter
        actual: u16,
    },

    // Device database errors
    /// Device database file could not be parsed
    #[error("device database error: {0}")]
    Database(String),
}

impl Error {
    /// Whether this error was raised before any wire traffic was issued
    pub fn is_rejected_request(&self) -> bool {
        matches!(
            self,
            Self::RangeViolation { .. } | Self::ReservedFlash { .. } | Self::ScratchpadUnsupported
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(e.to_string()),
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
