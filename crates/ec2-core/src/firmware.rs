//! Adapter firmware updater
//!
//! The adapter's application firmware is stored as a sequence of 512-byte
//! boot-loader pages. Images are laid out in a fixed block order that
//! differs between the two adapters; each block is erased, written and
//! checksummed before the next one is touched.

use crate::boot::{self, PAGE_SIZE};
use crate::error::{Error, Result};
use crate::link::Link;
use crate::progress::Progress;
use crate::transport::AdapterKind;

/// Boot-loader page of each image block on the serial adapter
pub const EC2_BLOCK_ORDER: [u8; 14] = [
    0x0f, 0x0a, 0x0d, 0x0e, 0x05, 0x06, 0x09, 0x07, 0x0b, 0x0c, 0x04, 0x08, 0x02, 0x03,
];

/// Boot-loader page of each image block on the USB adapter
pub const EC3_BLOCK_ORDER: [u8; 19] = [
    0x11, 0x12, 0x1b, 0x1d, 0x1c, 0x18, 0x19, 0x1a, 0x0b, 0x16, 0x17, 0x15, 0x13, 0x14, 0x10,
    0x0c, 0x0d, 0x0e, 0x0f,
];

/// Page selected after programming so the adapter starts the new image
const START_PAGE: u8 = 0x0c;

/// Puts the USB adapter's boot-loader into update mode
const EC3_UPDATE_PREAMBLE: ([u8; 3], [u8; 1]) = ([0x05, 0x17, 0xFF], [0xFF]);

/// Block order used by an adapter
pub fn block_order(adapter: AdapterKind) -> &'static [u8] {
    match adapter {
        AdapterKind::Serial => &EC2_BLOCK_ORDER,
        AdapterKind::Usb => &EC3_BLOCK_ORDER,
    }
}

/// Exact image size an adapter accepts
pub fn image_size(adapter: AdapterKind) -> usize {
    block_order(adapter).len() * PAGE_SIZE
}

/// Check an image before anything is erased
pub fn validate_image(adapter: AdapterKind, image: &[u8]) -> Result<()> {
    let expected = image_size(adapter);
    if image.len() != expected {
        return Err(Error::FirmwareImageSize {
            adapter: adapter.name(),
            expected,
            actual: image.len(),
        });
    }
    Ok(())
}

/// Reprogram the adapter's application firmware
///
/// The link must be talking to the adapter's boot-loader. On the serial
/// adapter the boot-loader is re-entered and resynchronised afterwards; the
/// USB adapter must be disconnected by the caller once this returns.
pub fn update(link: &mut Link, image: &[u8], progress: &mut Progress) -> Result<()> {
    let adapter = link.adapter();
    validate_image(adapter, image)?;
    log::info!(
        "updating {} firmware ({} blocks)",
        adapter,
        block_order(adapter).len()
    );

    progress.report(0);
    match adapter {
        AdapterKind::Serial => {
            link.reset_adapter()?;
            boot::sync(link)?;
            write_blocks(link, image, &EC2_BLOCK_ORDER, progress)?;
            boot::select_page(link, START_PAGE)?;
            link.reset_adapter()?;
            boot::sync(link)?;
            link.reset_adapter()?;
        }
        AdapterKind::Usb => {
            let (tx, rx) = EC3_UPDATE_PREAMBLE;
            link.exchange(&tx, &rx)?;
            write_blocks(link, image, &EC3_BLOCK_ORDER, progress)?;
            boot::select_page(link, START_PAGE)?;
        }
    }
    log::info!("{} firmware updated", adapter);
    Ok(())
}

fn write_blocks(link: &mut Link, image: &[u8], order: &[u8], progress: &mut Progress) -> Result<()> {
    for (i, (&page, block)) in order.iter().zip(image.chunks_exact(PAGE_SIZE)).enumerate() {
        let block: &[u8; PAGE_SIZE] = block
            .try_into()
            .map_err(|_| Error::Io("short firmware block".into()))?;
        log::debug!("firmware block {} -> page 0x{:02x}", i, page);
        boot::select_page(link, page)?;
        boot::erase_page(link)?;
        boot::write_page(link, block)?;
        let expected = boot::checksum(block);
        let actual = boot::page_checksum(link)?;
        if actual != expected {
            return Err(Error::ChecksumMismatch {
                block: page,
                expected,
                actual,
            });
        }
        progress.report_fraction(i + 1, order.len());
    }
    Ok(())
}
