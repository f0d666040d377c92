//! Built-in device table

use super::types::{DebugMode, DeviceDescriptor, FlashRange, LockLayout, Scratchpad};

struct Entry {
    name: &'static str,
    family: u8,
    unique_id: Option<u8>,
    flash_size: u32,
    sector_size: u32,
    xram_size: u32,
    external_bus: bool,
    tested: bool,
    lock: LockLayout,
    reserved: Option<FlashRange>,
    scratchpad: Option<Scratchpad>,
    paged_sfr: bool,
    usb_fifo_size: u32,
    mode: DebugMode,
}

const JTAG_SCRATCH_128: Scratchpad = Scratchpad {
    start: 0x0000,
    len: 128,
    sector_size: 128,
};

const ENTRIES: &[Entry] = &[
    Entry {
        name: "C8051F020",
        family: 0x03,
        unique_id: None,
        flash_size: 0x10000,
        sector_size: 512,
        xram_size: 4096,
        external_bus: true,
        tested: true,
        lock: LockLayout::ReadWrite {
            read: 0xFDFE,
            write: 0xFDFF,
        },
        reserved: Some(FlashRange::new(0xFE00, 0xFFFF)),
        scratchpad: Some(JTAG_SCRATCH_128),
        paged_sfr: false,
        usb_fifo_size: 0,
        mode: DebugMode::Jtag,
    },
    Entry {
        name: "C8051F040",
        family: 0x05,
        unique_id: None,
        flash_size: 0x10000,
        sector_size: 512,
        xram_size: 4096,
        external_bus: true,
        tested: true,
        lock: LockLayout::ReadWrite {
            read: 0xFDFE,
            write: 0xFDFF,
        },
        reserved: Some(FlashRange::new(0xFE00, 0xFFFF)),
        scratchpad: Some(JTAG_SCRATCH_128),
        paged_sfr: true,
        usb_fifo_size: 0,
        mode: DebugMode::Jtag,
    },
    Entry {
        name: "C8051F120",
        family: 0x12,
        unique_id: None,
        flash_size: 0x20000,
        sector_size: 1024,
        xram_size: 8192,
        external_bus: true,
        tested: false,
        lock: LockLayout::ReadWriteAlt {
            read: 0x1FBFE,
            write: 0x1FBFF,
        },
        reserved: Some(FlashRange::new(0x1FC00, 0x1FFFF)),
        scratchpad: Some(Scratchpad {
            start: 0x0000,
            len: 256,
            sector_size: 128,
        }),
        paged_sfr: true,
        usb_fifo_size: 0,
        mode: DebugMode::Jtag,
    },
    Entry {
        name: "C8051F310",
        family: 0x08,
        unique_id: None,
        flash_size: 0x4000,
        sector_size: 512,
        xram_size: 1024,
        external_bus: false,
        tested: true,
        lock: LockLayout::Single { addr: 0x3DFF },
        reserved: Some(FlashRange::new(0x3E00, 0x3FFF)),
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 0,
        mode: DebugMode::C2,
    },
    Entry {
        name: "C8051F320",
        family: 0x09,
        unique_id: None,
        flash_size: 0x4000,
        sector_size: 512,
        xram_size: 1024,
        external_bus: false,
        tested: true,
        lock: LockLayout::Single { addr: 0x3DFF },
        reserved: Some(FlashRange::new(0x3E00, 0x3FFF)),
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 1024,
        mode: DebugMode::C2,
    },
    Entry {
        name: "C8051F330",
        family: 0x0A,
        unique_id: None,
        flash_size: 0x2000,
        sector_size: 512,
        xram_size: 512,
        external_bus: false,
        tested: false,
        lock: LockLayout::Single { addr: 0x1DFF },
        reserved: Some(FlashRange::new(0x1E00, 0x1FFF)),
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 0,
        mode: DebugMode::C2,
    },
    Entry {
        name: "C8051F340",
        family: 0x0F,
        unique_id: Some(0x00),
        flash_size: 0x10000,
        sector_size: 512,
        xram_size: 4096,
        external_bus: true,
        tested: true,
        lock: LockLayout::SingleAlt { addr: 0xFBFF },
        reserved: Some(FlashRange::new(0xFC00, 0xFFFF)),
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 1024,
        mode: DebugMode::C2,
    },
    Entry {
        name: "C8051F341",
        family: 0x0F,
        unique_id: Some(0x01),
        flash_size: 0x8000,
        sector_size: 512,
        xram_size: 2048,
        external_bus: true,
        tested: false,
        lock: LockLayout::SingleAlt { addr: 0x7FFF },
        reserved: None,
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 1024,
        mode: DebugMode::C2,
    },
    Entry {
        name: "C8051F410",
        family: 0x0C,
        unique_id: None,
        flash_size: 0x8000,
        sector_size: 512,
        xram_size: 2048,
        external_bus: false,
        tested: false,
        lock: LockLayout::SingleAlt { addr: 0x7DFF },
        reserved: Some(FlashRange::new(0x7E00, 0x7FFF)),
        scratchpad: None,
        paged_sfr: false,
        usb_fifo_size: 0,
        mode: DebugMode::C2,
    },
];

/// Descriptors for every chip known without a database file
pub fn builtin_devices() -> Vec<DeviceDescriptor> {
    ENTRIES
        .iter()
        .map(|e| DeviceDescriptor {
            name: e.name.to_string(),
            family: e.family,
            unique_id: e.unique_id,
            revision: None,
            flash_size: e.flash_size,
            sector_size: e.sector_size,
            xram_size: e.xram_size,
            external_bus: e.external_bus,
            tested: e.tested,
            lock: e.lock,
            reserved: e.reserved,
            scratchpad: e.scratchpad,
            paged_sfr: e.paged_sfr,
            usb_fifo_size: e.usb_fifo_size,
            mode: e.mode,
        })
        .collect()
}
