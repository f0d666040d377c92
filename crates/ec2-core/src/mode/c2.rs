//! C2 mode driver
//!
//! Two-wire debug interface of the smaller parts. C2 targets have no
//! scratch-pad and a 16-bit breakpoint comparator.

use super::{addr24, TargetDriver};
use crate::device::DebugMode;
use crate::error::{Error, Result};
use crate::link::Link;

/// Command acknowledge byte
const ACK: &[u8] = &[0x0D];

const CMD_CONNECT: u8 = 0x20;
const CMD_DISCONNECT: u8 = 0x21;
const CMD_DEVICE_ID: u8 = 0x22;
const CMD_UNIQUE_ID: u8 = 0x23;
const CMD_GO: u8 = 0x24;
const CMD_HALT: u8 = 0x25;
const CMD_STEP: u8 = 0x26;
const CMD_HALT_POLL: u8 = 0x27;
const CMD_READ_SFR: u8 = 0x28;
const CMD_WRITE_SFR: u8 = 0x29;
const CMD_READ_RAM: u8 = 0x2A;
const CMD_WRITE_RAM: u8 = 0x2B;
const CMD_RESET: u8 = 0x2C;
const CMD_XDATA_PAGE: u8 = 0x2D;
const CMD_READ_FLASH: u8 = 0x2E;
const CMD_WRITE_FLASH: u8 = 0x2F;
const CMD_ERASE_SECTOR: u8 = 0x30;
const CMD_BP_ADDR: u8 = 0x31;
const CMD_BP_MASK: u8 = 0x32;
const CMD_ERASE_ALL: u8 = 0x3C;
const CMD_XDATA_WINDOW: u8 = 0x3D;
const CMD_XDATA_READ: u8 = 0x3E;
const CMD_XDATA_WRITE: u8 = 0x3F;

/// Halt-poll reply when the core is stopped
const HALTED: u8 = 0x01;

/// C2 mode driver
#[derive(Debug, Default)]
pub struct C2Driver;

impl C2Driver {
    /// Create a driver
    pub fn new() -> Self {
        Self
    }
}

impl TargetDriver for C2Driver {
    fn mode(&self) -> DebugMode {
        DebugMode::C2
    }

    fn connect_target(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_CONNECT], ACK)
    }

    fn disconnect_target(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_DISCONNECT], ACK)
    }

    fn device_id(&mut self, link: &mut Link) -> Result<u16> {
        let id: [u8; 2] = link.query(&[CMD_DEVICE_ID])?;
        Ok(u16::from_be_bytes(id))
    }

    fn unique_device_id(&mut self, link: &mut Link) -> Result<u8> {
        let [id] = link.query::<1>(&[CMD_UNIQUE_ID])?;
        Ok(id)
    }

    fn read_ram_sfr_chunk(
        &mut self,
        link: &mut Link,
        addr: u8,
        buf: &mut [u8],
        sfr: bool,
    ) -> Result<()> {
        let op = if sfr { CMD_READ_SFR } else { CMD_READ_RAM };
        link.query_into(&[op, addr, buf.len() as u8], buf)
    }

    fn write_ram_chunk(&mut self, link: &mut Link, addr: u8, data: &[u8]) -> Result<()> {
        let mut cmd = vec![CMD_WRITE_RAM, addr, data.len() as u8];
        cmd.extend_from_slice(data);
        link.exchange(&cmd, ACK)
    }

    fn write_sfr(&mut self, link: &mut Link, addr: u8, value: u8) -> Result<()> {
        link.exchange(&[CMD_WRITE_SFR, addr, 0x01, value], ACK)
    }

    fn xdata_begin(&mut self, link: &mut Link, page: u8) -> Result<()> {
        link.exchange(&[CMD_XDATA_WINDOW, 0x01], ACK)?;
        link.exchange(&[CMD_XDATA_PAGE, page], ACK)
    }

    fn xdata_end(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_XDATA_WINDOW, 0x00], ACK)
    }

    fn xdata_read_chunk(&mut self, link: &mut Link, offset: u8, buf: &mut [u8]) -> Result<()> {
        link.query_into(&[CMD_XDATA_READ, offset, buf.len() as u8], buf)
    }

    fn xdata_write_chunk(&mut self, link: &mut Link, offset: u8, data: &[u8]) -> Result<()> {
        let mut cmd = vec![CMD_XDATA_WRITE, offset, data.len() as u8];
        cmd.extend_from_slice(data);
        link.exchange(&cmd, ACK)
    }

    fn supports_scratchpad(&self) -> bool {
        false
    }

    fn read_flash_chunk(
        &mut self,
        link: &mut Link,
        addr: u32,
        buf: &mut [u8],
        scratch: bool,
    ) -> Result<()> {
        if scratch {
            return Err(Error::ScratchpadUnsupported);
        }
        let [lo, mid, hi] = addr24(addr);
        link.query_into(&[CMD_READ_FLASH, lo, mid, hi, buf.len() as u8], buf)
    }

    fn write_flash_chunk(
        &mut self,
        link: &mut Link,
        addr: u32,
        data: &[u8],
        scratch: bool,
    ) -> Result<()> {
        if scratch {
            return Err(Error::ScratchpadUnsupported);
        }
        let [lo, mid, hi] = addr24(addr);
        let mut cmd = vec![CMD_WRITE_FLASH, lo, mid, hi, data.len() as u8];
        cmd.extend_from_slice(data);
        link.exchange(&cmd, ACK)
    }

    fn erase_sector(&mut self, link: &mut Link, addr: u32, scratch: bool) -> Result<()> {
        if scratch {
            return Err(Error::ScratchpadUnsupported);
        }
        let [lo, mid, hi] = addr24(addr);
        link.exchange(&[CMD_ERASE_SECTOR, lo, mid, hi], ACK)
    }

    fn erase_all(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_ERASE_ALL], ACK)
    }

    fn set_breakpoint_address(&mut self, link: &mut Link, slot: u8, addr: u32) -> Result<()> {
        let [lo, hi] = (addr as u16).to_le_bytes();
        link.exchange(&[CMD_BP_ADDR, slot, lo, hi], ACK)
    }

    fn write_breakpoint_mask(&mut self, link: &mut Link, mask: u8) -> Result<()> {
        link.exchange(&[CMD_BP_MASK, mask], ACK)
    }

    fn halt(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_HALT], ACK)
    }

    fn go(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_GO], ACK)
    }

    fn step(&mut self, link: &mut Link) -> Result<u16> {
        link.exchange(&[CMD_STEP], ACK)?;
        self.read_pc(link)
    }

    fn reset(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_RESET], ACK)
    }

    fn halt_poll(&mut self, link: &mut Link) -> Result<bool> {
        let [state] = link.query::<1>(&[CMD_HALT_POLL])?;
        Ok(state == HALTED)
    }
}
