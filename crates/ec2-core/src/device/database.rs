//! Device database for runtime loading and lookup
//!
//! The built-in table can be extended with RON files describing extra chip
//! variants. Entries loaded later take precedence over earlier ones.

use std::fs;
use std::path::Path;

use super::builtin::builtin_devices;
use super::types::{DebugMode, DeviceDescriptor, FlashRange, LockLayout, Scratchpad};
use crate::error::{Error, Result};

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Size specification with human-readable units
#[derive(Debug, Clone, Copy, serde::Deserialize)]
enum Size {
    B(u32),
    KiB(u32),
}

impl Size {
    fn to_bytes(self) -> Option<u32> {
        match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
enum LockDef {
    #[default]
    None,
    Single(u32),
    SingleAlt(u32),
    ReadWrite(u32, u32),
    ReadWriteAlt(u32, u32),
}

impl From<LockDef> for LockLayout {
    fn from(def: LockDef) -> Self {
        match def {
            LockDef::None => LockLayout::None,
            LockDef::Single(addr) => LockLayout::Single { addr },
            LockDef::SingleAlt(addr) => LockLayout::SingleAlt { addr },
            LockDef::ReadWrite(read, write) => LockLayout::ReadWrite { read, write },
            LockDef::ReadWriteAlt(read, write) => LockLayout::ReadWriteAlt { read, write },
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ScratchpadDef {
    start: u32,
    len: u32,
    sector_size: u32,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DeviceDef {
    name: String,
    family: u8,
    #[serde(default)]
    unique_id: Option<u8>,
    #[serde(default)]
    revision: Option<u8>,
    flash_size: Size,
    sector_size: u32,
    #[serde(default)]
    xram_size: u32,
    #[serde(default)]
    external_bus: bool,
    #[serde(default)]
    tested: bool,
    #[serde(default)]
    lock: LockDef,
    #[serde(default)]
    reserved: Option<(u32, u32)>,
    #[serde(default)]
    scratchpad: Option<ScratchpadDef>,
    #[serde(default)]
    paged_sfr: bool,
    #[serde(default)]
    usb_fifo_size: u32,
    mode: DebugMode,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DeviceFile {
    devices: Vec<DeviceDef>,
}

impl DeviceDef {
    fn into_descriptor(self) -> Result<DeviceDescriptor> {
        let flash_size = self.flash_size.to_bytes().ok_or_else(|| {
            Error::Database(format!(
                "{}: flash size {:?} does not fit in 32 bits",
                self.name, self.flash_size
            ))
        })?;
        if self.sector_size == 0 || flash_size % self.sector_size != 0 {
            return Err(Error::Database(format!(
                "{}: flash size {} is not a multiple of sector size {}",
                self.name, flash_size, self.sector_size
            )));
        }
        let reserved = match self.reserved {
            Some((bottom, top)) if bottom > top || top >= flash_size => {
                return Err(Error::Database(format!(
                    "{}: reserved range 0x{:X}..=0x{:X} is invalid",
                    self.name, bottom, top
                )));
            }
            Some((bottom, top)) => Some(FlashRange::new(bottom, top)),
            None => None,
        };
        let scratchpad = match self.scratchpad {
            Some(sp) if sp.sector_size == 0 || sp.len % sp.sector_size != 0 => {
                return Err(Error::Database(format!(
                    "{}: scratch-pad length is not a multiple of its sector size",
                    self.name
                )));
            }
            Some(sp) => Some(Scratchpad {
                start: sp.start,
                len: sp.len,
                sector_size: sp.sector_size,
            }),
            None => None,
        };
        Ok(DeviceDescriptor {
            name: self.name,
            family: self.family,
            unique_id: self.unique_id,
            revision: self.revision,
            flash_size,
            sector_size: self.sector_size,
            xram_size: self.xram_size,
            external_bus: self.external_bus,
            tested: self.tested,
            lock: self.lock.into(),
            reserved,
            scratchpad,
            paged_sfr: self.paged_sfr,
            usb_fifo_size: self.usb_fifo_size,
            mode: self.mode,
        })
    }
}

// ============================================================================
// Device database
// ============================================================================

/// Runtime device database
#[derive(Debug, Clone, Default)]
pub struct DeviceDb {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceDb {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database holding the built-in table
    pub fn builtin() -> Self {
        Self {
            devices: builtin_devices(),
        }
    }

    /// Load device definitions from a RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Database(format!("{}: {}", path.display(), e)))?;
        self.load_ron(&content)
    }

    /// Load device definitions from a RON string
    pub fn load_ron(&mut self, content: &str) -> Result<usize> {
        let file: DeviceFile =
            ron::from_str(content).map_err(|e| Error::Database(e.to_string()))?;
        let mut loaded = file
            .devices
            .into_iter()
            .map(DeviceDef::into_descriptor)
            .collect::<Result<Vec<_>>>()?;
        let count = loaded.len();
        // newest definitions first so they shadow older ones
        loaded.extend(self.devices.drain(..));
        self.devices = loaded;
        Ok(count)
    }

    /// All devices
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Find a device by (family, revision)
    pub fn find_by_id(&self, family: u8, revision: u8) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.matches_id(family, revision))
    }

    /// Find a device by (family, unique id)
    pub fn find_by_unique_id(&self, family: u8, unique_id: u8) -> Option<&DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.matches_unique_id(family, unique_id))
    }

    /// Find devices by name (case-insensitive partial match)
    pub fn find_by_name(&self, name: &str) -> Vec<&DeviceDescriptor> {
        let name_lower = name.to_lowercase();
        self.devices
            .iter()
            .filter(|d| d.name.to_lowercase().contains(&name_lower))
            .collect()
    }
}
