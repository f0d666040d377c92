//! Per-mode target drivers
//!
//! JTAG and C2 targets are driven through different command sets but offer
//! the same operations. The session holds one [`TargetDriver`] chosen at
//! connect time and routes every target access through it.
//!
//! Drivers only encode commands. Range checks, SFR address translation and
//! SFR paging happen in the session before a driver is called.

mod c2;
mod jtag;

pub use c2::C2Driver;
pub use jtag::JtagDriver;

use crate::device::DebugMode;
use crate::error::Result;
use crate::link::Link;
use crate::paging::pages;

/// Largest data block moved by a single read or write command
pub const MAX_CHUNK: usize = 12;

/// XDATA window size
pub const XDATA_PAGE: u32 = 256;

/// Flash programming page used to split transfers
pub const FLASH_PAGE: u32 = 256;

/// Program-counter pseudo-SFR (low byte; high byte follows)
pub(crate) const PC_SFR: u8 = 0x20;

/// Create the driver for a debug mode
pub fn driver_for(mode: DebugMode) -> Box<dyn TargetDriver> {
    match mode {
        DebugMode::Jtag => Box::new(JtagDriver::new()),
        DebugMode::C2 => Box::new(C2Driver::new()),
    }
}

/// Operations a debug mode provides
///
/// Required methods are single wire commands. Provided methods split longer
/// transfers into pages and chunks.
pub trait TargetDriver: Send {
    /// Debug mode this driver speaks
    fn mode(&self) -> DebugMode;

    // Connection

    /// Select the mode on the adapter and attach to the target
    fn connect_target(&mut self, link: &mut Link) -> Result<()>;

    /// Detach from the target
    fn disconnect_target(&mut self, link: &mut Link) -> Result<()>;

    /// 16-bit identification value: family in the high byte, revision low
    fn device_id(&mut self, link: &mut Link) -> Result<u16>;

    /// Variant id distinguishing chips that share a family byte
    fn unique_device_id(&mut self, link: &mut Link) -> Result<u8>;

    // Data memory

    /// Read up to [`MAX_CHUNK`] bytes of RAM, or of SFR space if `sfr`
    fn read_ram_sfr_chunk(&mut self, link: &mut Link, addr: u8, buf: &mut [u8], sfr: bool)
        -> Result<()>;

    /// Write up to [`MAX_CHUNK`] bytes of RAM
    fn write_ram_chunk(&mut self, link: &mut Link, addr: u8, data: &[u8]) -> Result<()>;

    /// Write one SFR
    fn write_sfr(&mut self, link: &mut Link, addr: u8, value: u8) -> Result<()>;

    /// Open the XDATA window on `page`
    fn xdata_begin(&mut self, link: &mut Link, page: u8) -> Result<()>;

    /// Close the XDATA window
    fn xdata_end(&mut self, link: &mut Link) -> Result<()>;

    /// Read up to [`MAX_CHUNK`] bytes inside the open XDATA window
    fn xdata_read_chunk(&mut self, link: &mut Link, offset: u8, buf: &mut [u8]) -> Result<()>;

    /// Write up to [`MAX_CHUNK`] bytes inside the open XDATA window
    fn xdata_write_chunk(&mut self, link: &mut Link, offset: u8, data: &[u8]) -> Result<()>;

    // Flash

    /// Whether the scratch-pad can be reached in this mode
    fn supports_scratchpad(&self) -> bool;

    /// Read up to [`MAX_CHUNK`] bytes of code or scratch-pad flash
    fn read_flash_chunk(&mut self, link: &mut Link, addr: u32, buf: &mut [u8], scratch: bool)
        -> Result<()>;

    /// Program up to [`MAX_CHUNK`] bytes of code or scratch-pad flash
    fn write_flash_chunk(&mut self, link: &mut Link, addr: u32, data: &[u8], scratch: bool)
        -> Result<()>;

    /// Erase the sector starting at `addr`
    fn erase_sector(&mut self, link: &mut Link, addr: u32, scratch: bool) -> Result<()>;

    /// Erase all user code flash
    fn erase_all(&mut self, link: &mut Link) -> Result<()>;

    // Breakpoints

    /// Program the comparator address of a breakpoint slot
    fn set_breakpoint_address(&mut self, link: &mut Link, slot: u8, addr: u32) -> Result<()>;

    /// Write the enable mask of all breakpoint slots
    fn write_breakpoint_mask(&mut self, link: &mut Link, mask: u8) -> Result<()>;

    // Execution control

    /// Request the core to stop
    fn halt(&mut self, link: &mut Link) -> Result<()>;

    /// Start the core from the current program counter
    fn go(&mut self, link: &mut Link) -> Result<()>;

    /// Execute one instruction and return the new program counter
    fn step(&mut self, link: &mut Link) -> Result<u16>;

    /// Reset the target core
    fn reset(&mut self, link: &mut Link) -> Result<()>;

    /// Query once whether the core has halted
    fn halt_poll(&mut self, link: &mut Link) -> Result<bool>;

    /// Read the program counter
    fn read_pc(&mut self, link: &mut Link) -> Result<u16> {
        let mut pc = [0u8; 2];
        self.read_ram_sfr_chunk(link, PC_SFR, &mut pc, true)?;
        Ok(u16::from_le_bytes(pc))
    }

    /// Set the program counter
    fn set_pc(&mut self, link: &mut Link, pc: u16) -> Result<()> {
        let [lo, hi] = pc.to_le_bytes();
        self.write_sfr(link, PC_SFR, lo)?;
        self.write_sfr(link, PC_SFR + 1, hi)
    }

    // Provided transfers

    /// Read RAM or SFR bytes of any length
    fn read_ram_sfr(&mut self, link: &mut Link, addr: u8, buf: &mut [u8], sfr: bool) -> Result<()> {
        for (i, chunk) in buf.chunks_mut(MAX_CHUNK).enumerate() {
            let at = addr.wrapping_add((i * MAX_CHUNK) as u8);
            self.read_ram_sfr_chunk(link, at, chunk, sfr)?;
        }
        Ok(())
    }

    /// Write RAM bytes of any length
    fn write_ram(&mut self, link: &mut Link, addr: u8, data: &[u8]) -> Result<()> {
        for (i, chunk) in data.chunks(MAX_CHUNK).enumerate() {
            let at = addr.wrapping_add((i * MAX_CHUNK) as u8);
            self.write_ram_chunk(link, at, chunk)?;
        }
        Ok(())
    }

    /// Read XDATA, opening and closing the window at every page crossing
    fn read_xdata(&mut self, link: &mut Link, addr: u16, buf: &mut [u8]) -> Result<()> {
        for span in pages(addr as u32, buf.len(), XDATA_PAGE) {
            self.xdata_begin(link, span.page as u8)?;
            let part = &mut buf[span.buf_offset..span.buf_offset + span.len];
            for (i, chunk) in part.chunks_mut(MAX_CHUNK).enumerate() {
                let offset = span.offset as usize + i * MAX_CHUNK;
                self.xdata_read_chunk(link, offset as u8, chunk)?;
            }
            self.xdata_end(link)?;
        }
        Ok(())
    }

    /// Write XDATA, opening and closing the window at every page crossing
    fn write_xdata(&mut self, link: &mut Link, addr: u16, data: &[u8]) -> Result<()> {
        for span in pages(addr as u32, data.len(), XDATA_PAGE) {
            self.xdata_begin(link, span.page as u8)?;
            let part = &data[span.buf_offset..span.buf_offset + span.len];
            for (i, chunk) in part.chunks(MAX_CHUNK).enumerate() {
                let offset = span.offset as usize + i * MAX_CHUNK;
                self.xdata_write_chunk(link, offset as u8, chunk)?;
            }
            self.xdata_end(link)?;
        }
        Ok(())
    }

    /// Read flash of any length
    fn read_flash(&mut self, link: &mut Link, addr: u32, buf: &mut [u8], scratch: bool) -> Result<()> {
        for span in pages(addr, buf.len(), FLASH_PAGE) {
            let base = span.address(FLASH_PAGE);
            let part = &mut buf[span.buf_offset..span.buf_offset + span.len];
            for (i, chunk) in part.chunks_mut(MAX_CHUNK).enumerate() {
                self.read_flash_chunk(link, base + (i * MAX_CHUNK) as u32, chunk, scratch)?;
            }
        }
        Ok(())
    }

    /// Program flash of any length; the bytes must already be erased
    fn write_flash(&mut self, link: &mut Link, addr: u32, data: &[u8], scratch: bool) -> Result<()> {
        for span in pages(addr, data.len(), FLASH_PAGE) {
            let base = span.address(FLASH_PAGE);
            let part = &data[span.buf_offset..span.buf_offset + span.len];
            for (i, chunk) in part.chunks(MAX_CHUNK).enumerate() {
                self.write_flash_chunk(link, base + (i * MAX_CHUNK) as u32, chunk, scratch)?;
            }
        }
        Ok(())
    }
}

/// Split a flash address into the 3 little-endian bytes sent on the wire
pub(crate) fn addr24(addr: u32) -> [u8; 3] {
    let [lo, mid, hi, _] = addr.to_le_bytes();
    [lo, mid, hi]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr24() {
        assert_eq!(addr24(0x01_23_45), [0x45, 0x23, 0x01]);
    }

    #[test]
    fn test_driver_for() {
        assert_eq!(driver_for(DebugMode::Jtag).mode(), DebugMode::Jtag);
        assert_eq!(driver_for(DebugMode::C2).mode(), DebugMode::C2);
        assert!(driver_for(DebugMode::Jtag).supports_scratchpad());
        assert!(!driver_for(DebugMode::C2).supports_scratchpad());
    }
}
