//! Flash programming engine
//!
//! Range validation and the write strategies shared by both debug modes.
//! Everything here talks to the chip through [`FlashAccess`], so the same
//! code runs against a live target or an in-memory fake.
//!
//! # Write strategies
//!
//! - [`write_flash`]: program only; the bytes must already be erased
//! - [`write_flash_auto_erase`]: erase every spanned sector, then program
//! - [`write_flash_auto_keep`]: read the spanned sectors, erase the ones
//!   that are not blank, merge the new bytes in and program the whole span
//!
//! Every operation validates its range before the first command is issued.

use crate::device::{DeviceDescriptor, Scratchpad};
use crate::error::{AddressSpace, Error, Result};
use crate::paging::{pages, sector_range};

/// Flash region a command is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Main code flash
    Code,
    /// Scratch-pad flash
    Scratchpad,
}

/// Raw flash primitives of a connected target
pub trait FlashAccess {
    /// Descriptor of the connected chip
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Whether the active debug mode can reach the scratch-pad
    fn supports_scratchpad(&self) -> bool;

    /// Read `buf.len()` bytes starting at `addr`
    fn read(&mut self, region: Region, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Program bytes at `addr`; only clears bits
    fn program(&mut self, region: Region, addr: u32, data: &[u8]) -> Result<()>;

    /// Erase the sector starting at `addr`
    fn erase_sector(&mut self, region: Region, addr: u32) -> Result<()>;

    /// Erase all code flash
    fn erase_all(&mut self) -> Result<()>;

    /// Report coarse progress of a long operation
    fn progress(&mut self, _percent: u8) {}
}

fn flash_violation(start: u32, len: usize) -> Error {
    Error::RangeViolation {
        space: AddressSpace::Flash,
        start,
        len,
    }
}

/// Check that `[start, start + len)` may be accessed
///
/// The range must be non-empty, lie inside the device's flash and stay
/// clear of its reserved area.
pub fn check_flash_range(dev: &DeviceDescriptor, start: u32, len: usize) -> Result<()> {
    if len == 0 || start as u64 + len as u64 > dev.flash_size as u64 {
        return Err(flash_violation(start, len));
    }
    if dev.reserved.is_some_and(|r| r.intersects(start, len)) {
        log::error!(
            "refusing access to reserved flash 0x{:05X}+{} on {}",
            start,
            len,
            dev.name
        );
        return Err(Error::ReservedFlash { start, len });
    }
    Ok(())
}

/// Check a scratch-pad range given as 0-based offsets
///
/// Returns the scratch-pad geometry on success.
pub fn check_scratchpad_range(
    dev: &DeviceDescriptor,
    mode_supported: bool,
    offset: u32,
    len: usize,
) -> Result<Scratchpad> {
    let sp = match dev.scratchpad {
        Some(sp) if mode_supported => sp,
        _ => return Err(Error::ScratchpadUnsupported),
    };
    if len == 0 || offset as u64 + len as u64 > sp.len as u64 {
        return Err(Error::RangeViolation {
            space: AddressSpace::Scratchpad,
            start: offset,
            len,
        });
    }
    Ok(sp)
}

/// Read code flash
///
/// Progress is reported once per sector read.
pub fn read_flash<F: FlashAccess + ?Sized>(f: &mut F, start: u32, buf: &mut [u8]) -> Result<()> {
    check_flash_range(f.descriptor(), start, buf.len())?;
    let sector_size = f.descriptor().sector_size;
    let total = sector_range(start, buf.len(), sector_size).count();
    f.progress(0);
    for (i, span) in pages(start, buf.len(), sector_size).enumerate() {
        let piece = &mut buf[span.buf_offset..span.buf_offset + span.len];
        f.read(Region::Code, span.address(sector_size), piece)?;
        f.progress(((i + 1) * 100 / total) as u8);
    }
    Ok(())
}

/// Program already-erased code flash
///
/// Progress is reported once per sector programmed.
pub fn write_flash<F: FlashAccess + ?Sized>(f: &mut F, start: u32, data: &[u8]) -> Result<()> {
    check_flash_range(f.descriptor(), start, data.len())?;
    let sector_size = f.descriptor().sector_size;
    let total = sector_range(start, data.len(), sector_size).count();
    f.progress(0);
    for (i, span) in pages(start, data.len(), sector_size).enumerate() {
        let piece = &data[span.buf_offset..span.buf_offset + span.len];
        f.program(Region::Code, span.address(sector_size), piece)?;
        f.progress(((i + 1) * 100 / total) as u8);
    }
    Ok(())
}

/// Validate every sector spanned by a range and return their base addresses
fn spanned_sectors(dev: &DeviceDescriptor, start: u32, len: usize) -> Result<Vec<u32>> {
    check_flash_range(dev, start, len)?;
    let sectors: Vec<u32> = sector_range(start, len, dev.sector_size)
        .map(|s| s * dev.sector_size)
        .collect();
    for &base in &sectors {
        check_flash_range(dev, base, dev.sector_size as usize)?;
    }
    Ok(sectors)
}

/// Erase every sector spanned by the range, then program it
///
/// Other data in those sectors is lost.
pub fn write_flash_auto_erase<F: FlashAccess + ?Sized>(
    f: &mut F,
    start: u32,
    data: &[u8],
) -> Result<()> {
    let sectors = spanned_sectors(f.descriptor(), start, data.len())?;
    let total = sectors.len() + 1;
    f.progress(0);
    for (i, &base) in sectors.iter().enumerate() {
        log::debug!("erasing sector at 0x{:05X}", base);
        f.erase_sector(Region::Code, base)?;
        f.progress(((i + 1) * 100 / total) as u8);
    }
    f.program(Region::Code, start, data)?;
    f.progress(100);
    Ok(())
}

/// Program a range while preserving the rest of the spanned sectors
///
/// Sectors that read back fully erased are not erased again.
pub fn write_flash_auto_keep<F: FlashAccess + ?Sized>(
    f: &mut F,
    start: u32,
    data: &[u8],
) -> Result<()> {
    let sector_size = f.descriptor().sector_size;
    let sectors = spanned_sectors(f.descriptor(), start, data.len())?;
    let span_start = sectors[0];
    let mut merged = vec![0u8; sectors.len() * sector_size as usize];
    let total = sectors.len() + 2;

    f.progress(0);
    f.read(Region::Code, span_start, &mut merged)?;
    f.progress((100 / total) as u8);

    for (i, (&base, contents)) in sectors
        .iter()
        .zip(merged.chunks(sector_size as usize))
        .enumerate()
    {
        if contents.iter().any(|&b| b != 0xFF) {
            log::debug!("erasing non-blank sector at 0x{:05X}", base);
            f.erase_sector(Region::Code, base)?;
        }
        f.progress(((i + 2) * 100 / total) as u8);
    }

    let at = (start - span_start) as usize;
    merged[at..at + data.len()].copy_from_slice(data);
    f.program(Region::Code, span_start, &merged)?;
    f.progress(100);
    Ok(())
}

/// Erase the sector containing `addr`
pub fn erase_sector<F: FlashAccess + ?Sized>(f: &mut F, addr: u32) -> Result<()> {
    let dev = f.descriptor();
    let base = addr / dev.sector_size * dev.sector_size;
    check_flash_range(dev, base, dev.sector_size as usize)?;
    f.erase_sector(Region::Code, base)
}

/// Erase all user code flash
pub fn erase_all<F: FlashAccess + ?Sized>(f: &mut F) -> Result<()> {
    f.progress(0);
    f.erase_all()?;
    f.progress(100);
    Ok(())
}

/// Read the scratch-pad
pub fn read_scratchpad<F: FlashAccess + ?Sized>(
    f: &mut F,
    offset: u32,
    buf: &mut [u8],
) -> Result<()> {
    let sp = check_scratchpad_range(f.descriptor(), f.supports_scratchpad(), offset, buf.len())?;
    f.read(Region::Scratchpad, sp.start + offset, buf)
}

/// Program already-erased scratch-pad bytes
pub fn write_scratchpad<F: FlashAccess + ?Sized>(f: &mut F, offset: u32, data: &[u8]) -> Result<()> {
    let sp = check_scratchpad_range(f.descriptor(), f.supports_scratchpad(), offset, data.len())?;
    f.program(Region::Scratchpad, sp.start + offset, data)
}

/// Program scratch-pad bytes while preserving the rest of the scratch-pad
pub fn write_scratchpad_merge<F: FlashAccess + ?Sized>(
    f: &mut F,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    let sp = check_scratchpad_range(f.descriptor(), f.supports_scratchpad(), offset, data.len())?;
    let mut merged = vec![0u8; sp.len as usize];

    f.progress(0);
    f.read(Region::Scratchpad, sp.start, &mut merged)?;
    let at = offset as usize;
    merged[at..at + data.len()].copy_from_slice(data);
    f.progress(45);
    erase_scratchpad_sectors(f, sp)?;
    f.progress(55);
    f.program(Region::Scratchpad, sp.start, &merged)?;
    f.progress(100);
    Ok(())
}

/// Erase every scratch-pad sector
pub fn erase_scratchpad<F: FlashAccess + ?Sized>(f: &mut F) -> Result<()> {
    let sp = match f.descriptor().scratchpad {
        Some(sp) if f.supports_scratchpad() => sp,
        _ => return Err(Error::ScratchpadUnsupported),
    };
    let total = sp.sector_count() as usize;
    f.progress(0);
    for i in 0..sp.sector_count() {
        f.erase_sector(Region::Scratchpad, sp.start + i * sp.sector_size)?;
        f.progress(((i as usize + 1) * 100 / total) as u8);
    }
    Ok(())
}

fn erase_scratchpad_sectors<F: FlashAccess + ?Sized>(f: &mut F, sp: Scratchpad) -> Result<()> {
    for i in 0..sp.sector_count() {
        f.erase_sector(Region::Scratchpad, sp.start + i * sp.sector_size)?;
    }
    Ok(())
}
