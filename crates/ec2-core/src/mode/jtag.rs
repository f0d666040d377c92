//! JTAG mode driver
//!
//! Most JTAG commands carry a sub-command byte after the opcode. Flash
//! commands take a flag byte selecting the scratch-pad, followed by a 24-bit
//! address, since the larger parts have more than 64 KiB of code flash.

use super::{addr24, TargetDriver};
use crate::device::DebugMode;
use crate::error::Result;
use crate::link::{Link, Script, Step};

const ACK: &[u8] = &[0x0D];

const CMD_READ_SFR: [u8; 2] = [0x02, 0x02];
const CMD_WRITE_SFR: [u8; 2] = [0x03, 0x02];
const CMD_READ_RAM: [u8; 2] = [0x06, 0x02];
const CMD_WRITE_RAM: [u8; 2] = [0x07, 0x02];
const CMD_GO: [u8; 2] = [0x08, 0x00];
const CMD_STEP: [u8; 2] = [0x09, 0x00];
const CMD_DEVICE_ID: [u8; 2] = [0x0A, 0x00];
const CMD_HALT: [u8; 2] = [0x0B, 0x00];
const CMD_UNIQUE_ID: [u8; 2] = [0x10, 0x00];
const CMD_RESET: [u8; 2] = [0x11, 0x00];
const CMD_XDATA: u8 = 0x12;
const CMD_HALT_POLL: [u8; 2] = [0x13, 0x00];
const CMD_READ_FLASH: u8 = 0x14;
const CMD_WRITE_FLASH: u8 = 0x15;
const CMD_ERASE_SECTOR: u8 = 0x16;
const CMD_ERASE_ALL: [u8; 2] = [0x17, 0x00];
const CMD_BP_ADDR: u8 = 0x19;
const CMD_BP_MASK: u8 = 0x1A;
const CMD_DISCONNECT: [u8; 2] = [0x1B, 0x00];

// XDATA sub-commands
const XDATA_CLOSE: u8 = 0x00;
const XDATA_OPEN: u8 = 0x01;
const XDATA_PAGE: u8 = 0x02;
const XDATA_READ: u8 = 0x03;
const XDATA_WRITE: u8 = 0x04;

const FLAG_CODE: u8 = 0x00;
const FLAG_SCRATCH: u8 = 0x01;

const HALTED: u8 = 0x01;

/// Select JTAG on the adapter and stop the core
static CONNECT: Script = Script::new(
    "jtag connect",
    &[Step::new(&[0x04], ACK), Step::new(&CMD_HALT, ACK)],
);

/// JTAG mode driver
#[derive(Debug, Default)]
pub struct JtagDriver;

impl JtagDriver {
    /// Create a driver
    pub fn new() -> Self {
        Self
    }
}

fn flash_flag(scratch: bool) -> u8 {
    if scratch {
        FLAG_SCRATCH
    } else {
        FLAG_CODE
    }
}

impl TargetDriver for JtagDriver {
    fn mode(&self) -> DebugMode {
        DebugMode::Jtag
    }

    fn connect_target(&mut self, link: &mut Link) -> Result<()> {
        CONNECT.run(link)
    }

    fn disconnect_target(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&CMD_DISCONNECT, ACK)
    }

    fn device_id(&mut self, link: &mut Link) -> Result<u16> {
        let id: [u8; 2] = link.query(&CMD_DEVICE_ID)?;
        Ok(u16::from_be_bytes(id))
    }

    fn unique_device_id(&mut self, link: &mut Link) -> Result<u8> {
        let [id] = link.query::<1>(&CMD_UNIQUE_ID)?;
        Ok(id)
    }

    fn read_ram_sfr_chunk(
        &mut self,
        link: &mut Link,
        addr: u8,
        buf: &mut [u8],
        sfr: bool,
    ) -> Result<()> {
        let [op, sub] = if sfr { CMD_READ_SFR } else { CMD_READ_RAM };
        link.query_into(&[op, sub, addr, buf.len() as u8], buf)
    }

    fn write_ram_chunk(&mut self, link: &mut Link, addr: u8, data: &[u8]) -> Result<()> {
        // one byte per command
        let [op, sub] = CMD_WRITE_RAM;
        for (i, &byte) in data.iter().enumerate() {
            link.exchange(&[op, sub, addr.wrapping_add(i as u8), byte], ACK)?;
        }
        Ok(())
    }

    fn write_sfr(&mut self, link: &mut Link, addr: u8, value: u8) -> Result<()> {
        let [op, sub] = CMD_WRITE_SFR;
        link.exchange(&[op, sub, addr, value], ACK)
    }

    fn xdata_begin(&mut self, link: &mut Link, page: u8) -> Result<()> {
        link.exchange(&[CMD_XDATA, XDATA_OPEN], ACK)?;
        link.exchange(&[CMD_XDATA, XDATA_PAGE, page], ACK)
    }

    fn xdata_end(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&[CMD_XDATA, XDATA_CLOSE], ACK)
    }

    fn xdata_read_chunk(&mut self, link: &mut Link, offset: u8, buf: &mut [u8]) -> Result<()> {
        link.query_into(&[CMD_XDATA, XDATA_READ, offset, buf.len() as u8], buf)
    }

    fn xdata_write_chunk(&mut self, link: &mut Link, offset: u8, data: &[u8]) -> Result<()> {
        let mut cmd = vec![CMD_XDATA, XDATA_WRITE, offset, data.len() as u8];
        cmd.extend_from_slice(data);
        link.exchange(&cmd, ACK)
    }

    fn supports_scratchpad(&self) -> bool {
        true
    }

    fn read_flash_chunk(
        &mut self,
        link: &mut Link,
        addr: u32,
        buf: &mut [u8],
        scratch: bool,
    ) -> Result<()> {
        let [lo, mid, hi] = addr24(addr);
        let cmd = [CMD_READ_FLASH, flash_flag(scratch), lo, mid, hi, buf.len() as u8];
        link.query_into(&cmd, buf)
    }

    fn write_flash_chunk(
        &mut self,
        link: &mut Link,
        addr: u32,
        data: &[u8],
        scratch: bool,
    ) -> Result<()> {
        let [lo, mid, hi] = addr24(addr);
        let mut cmd = vec![CMD_WRITE_FLASH, flash_flag(scratch), lo, mid, hi, data.len() as u8];
        cmd.extend_from_slice(data);
        link.exchange(&cmd, ACK)
    }

    fn erase_sector(&mut self, link: &mut Link, addr: u32, scratch: bool) -> Result<()> {
        let [lo, mid, hi] = addr24(addr);
        link.exchange(&[CMD_ERASE_SECTOR, flash_flag(scratch), lo, mid, hi], ACK)
    }

    fn erase_all(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&CMD_ERASE_ALL, ACK)
    }

    fn set_breakpoint_address(&mut self, link: &mut Link, slot: u8, addr: u32) -> Result<()> {
        let [lo, mid, hi] = addr24(addr);
        link.exchange(&[CMD_BP_ADDR, slot, lo, mid, hi], ACK)
    }

    fn write_breakpoint_mask(&mut self, link: &mut Link, mask: u8) -> Result<()> {
        link.exchange(&[CMD_BP_MASK, mask], ACK)
    }

    fn halt(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&CMD_HALT, ACK)
    }

    fn go(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&CMD_GO, ACK)
    }

    fn step(&mut self, link: &mut Link) -> Result<u16> {
        link.exchange(&CMD_STEP, ACK)?;
        // the core must report halted again before the PC is valid
        link.exchange(&CMD_HALT_POLL, &[HALTED])?;
        self.read_pc(link)
    }

    fn reset(&mut self, link: &mut Link) -> Result<()> {
        link.exchange(&CMD_RESET, ACK)
    }

    fn halt_poll(&mut self, link: &mut Link) -> Result<bool> {
        let [state] = link.query::<1>(&CMD_HALT_POLL)?;
        Ok(state == HALTED)
    }
}
