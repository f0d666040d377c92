//! Device descriptor types

use core::fmt;

/// Debug interface exposed by a target's on-chip debug logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum DebugMode {
    /// JTAG-style 4-wire debug port
    Jtag,
    /// 2-wire C2 interface
    C2,
}

impl fmt::Display for DebugMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugMode::Jtag => write!(f, "JTAG"),
            DebugMode::C2 => write!(f, "C2"),
        }
    }
}

/// Inclusive flash address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRange {
    /// First address
    pub bottom: u32,
    /// Last address (inclusive)
    pub top: u32,
}

impl FlashRange {
    /// Create a range
    pub const fn new(bottom: u32, top: u32) -> Self {
        Self { bottom, top }
    }

    /// Whether `[start, start + len)` shares at least one byte with this range
    pub fn intersects(&self, start: u32, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        let last = start as u64 + len as u64 - 1;
        (start as u64) <= self.top as u64 && last >= self.bottom as u64
    }
}

/// Flash lock byte layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockLayout {
    /// No lock byte
    None,
    /// One lock byte covering read and write/erase
    Single {
        /// Lock byte address
        addr: u32,
    },
    /// One lock byte, alternate encoding
    SingleAlt {
        /// Lock byte address
        addr: u32,
    },
    /// Separate read and write/erase lock bytes
    ReadWrite {
        /// Read lock address
        read: u32,
        /// Write/erase lock address
        write: u32,
    },
    /// Separate read and write/erase lock bytes, alternate encoding
    ReadWriteAlt {
        /// Read lock address
        read: u32,
        /// Write/erase lock address
        write: u32,
    },
}

impl LockLayout {
    /// Addresses of every lock byte
    pub fn addresses(&self) -> Vec<u32> {
        match *self {
            LockLayout::None => Vec::new(),
            LockLayout::Single { addr } | LockLayout::SingleAlt { addr } => vec![addr],
            LockLayout::ReadWrite { read, write } | LockLayout::ReadWriteAlt { read, write } => {
                vec![read, write]
            }
        }
    }
}

/// Scratch-pad flash geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad {
    /// Address the first scratch-pad byte is programmed at
    pub start: u32,
    /// Total size in bytes
    pub len: u32,
    /// Erase granularity in bytes
    pub sector_size: u32,
}

impl Scratchpad {
    /// Number of scratch-pad sectors
    pub fn sector_count(&self) -> u32 {
        self.len / self.sector_size
    }
}

/// Characteristics of one chip variant
///
/// Looked up once after identification and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Marketing name, e.g. `C8051F020`
    pub name: String,
    /// Family byte (high byte of the identification value)
    pub family: u8,
    /// Unique-id byte distinguishing variants inside a family
    pub unique_id: Option<u8>,
    /// Revision byte, `None` matches any revision
    pub revision: Option<u8>,
    /// Code flash size in bytes
    pub flash_size: u32,
    /// Code flash erase sector size in bytes
    pub sector_size: u32,
    /// On-chip XRAM size in bytes
    pub xram_size: u32,
    /// External memory interface present
    pub external_bus: bool,
    /// Verified against real hardware
    pub tested: bool,
    /// Lock byte layout
    pub lock: LockLayout,
    /// Flash area that must never be programmed
    pub reserved: Option<FlashRange>,
    /// Scratch-pad geometry, if present
    pub scratchpad: Option<Scratchpad>,
    /// SFRs live on multiple pages selected through SFRPAGE
    pub paged_sfr: bool,
    /// USB FIFO RAM size in bytes (0 if none)
    pub usb_fifo_size: u32,
    /// Debug interface the chip exposes
    pub mode: DebugMode,
}

impl DeviceDescriptor {
    /// Whether this descriptor matches an identification value
    pub fn matches_id(&self, family: u8, revision: u8) -> bool {
        self.family == family && self.revision.map_or(true, |r| r == revision)
    }

    /// Whether this descriptor matches a (family, unique id) pair
    pub fn matches_unique_id(&self, family: u8, unique_id: u8) -> bool {
        self.family == family && self.unique_id == Some(unique_id)
    }

    /// Addresses of the flash lock bytes
    pub fn lock_byte_addresses(&self) -> Vec<u32> {
        self.lock.addresses()
    }

    /// Whether the device has a usable scratch-pad
    pub fn has_scratchpad(&self) -> bool {
        self.scratchpad.is_some()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} KiB flash, {}, family 0x{:02X})",
            self.name,
            self.flash_size / 1024,
            self.mode,
            self.family
        )
    }
}
