//! Adapter boot-loader protocol
//!
//! After a reset both adapters sit in a small boot-loader that can report
//! its version, select one of its 512-byte flash pages, erase, program and
//! checksum that page, and jump into the application firmware.

use crate::error::Result;
use crate::link::Link;

/// Size of one boot-loader flash page
pub const PAGE_SIZE: usize = 512;

/// Page selected before starting the application on the serial adapter
pub const SERIAL_APP_PAGE: u8 = 0x03;

/// Page selected before starting the application on the USB adapter
pub const USB_APP_PAGE: u8 = 0x0c;

const SYNC: u8 = 0x55;
const SYNC_REPLY: u8 = 0x5A;
const OK: &[u8] = &[0x00];

const CMD_GET_VERSION: [u8; 3] = [0x00, 0x00, 0x00];
const CMD_SELECT_PAGE: u8 = 0x01;
const CMD_ERASE_PAGE: [u8; 3] = [0x02, 0x00, 0x00];
const CMD_WRITE_PAGE: [u8; 3] = [0x03, 0x02, 0x00];
const CMD_PAGE_CHECKSUM: [u8; 3] = [0x04, 0x00, 0x00];
const CMD_RUN_APP: [u8; 3] = [0x06, 0x00, 0x00];

/// Autobaud handshake of the serial adapter
pub fn sync(link: &mut Link) -> Result<()> {
    link.exchange(&[SYNC], &[SYNC_REPLY])
}

/// Boot-loader version byte
pub fn get_version(link: &mut Link) -> Result<u8> {
    let [version] = link.query::<1>(&CMD_GET_VERSION)?;
    Ok(version)
}

/// Select the flash page following commands act on
pub fn select_page(link: &mut Link, page: u8) -> Result<()> {
    link.exchange(&[CMD_SELECT_PAGE, page, 0x00], OK)
}

/// Erase the selected page
pub fn erase_page(link: &mut Link) -> Result<()> {
    link.exchange(&CMD_ERASE_PAGE, OK)
}

/// Program the selected page with one 512-byte block
///
/// The block is streamed in pieces no larger than the transport's maximum
/// payload; the boot-loader acknowledges once the whole block has arrived.
pub fn write_page(link: &mut Link, block: &[u8; PAGE_SIZE]) -> Result<()> {
    link.send(&CMD_WRITE_PAGE)?;
    let piece = link.max_payload().min(PAGE_SIZE);
    for chunk in block.chunks(piece) {
        link.send(chunk)?;
    }
    link.expect(OK)
}

/// Checksum the adapter computes over the selected page
pub fn page_checksum(link: &mut Link) -> Result<u16> {
    let sum: [u8; 2] = link.query(&CMD_PAGE_CHECKSUM)?;
    Ok(u16::from_le_bytes(sum))
}

/// Start the application firmware and return its version byte
pub fn run_app(link: &mut Link) -> Result<u8> {
    let [version] = link.query::<1>(&CMD_RUN_APP)?;
    Ok(version)
}

/// 16-bit wrapping byte sum, as computed by [`page_checksum`]
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}
