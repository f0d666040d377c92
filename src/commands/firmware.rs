//! Adapter firmware update

use std::fs;
use std::path::Path;

use ec2_core::{Mode, Session};

use super::{attach_progress, Target};
use crate::adapters::AdapterConnector;

/// Reprogram the adapter from a firmware image
pub fn run_firmware(target: &Target<'_>, image: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(image)?;

    let mut session = Session::new(Mode::Bootloader);
    session.set_trace(target.trace);
    session.connect(target.port, &AdapterConnector, target.db)?;
    if let (Some(adapter), Some(version)) = (session.adapter(), session.firmware_version()) {
        println!("{} currently at firmware 0x{:02x}", adapter, version);
    }

    let pb = attach_progress(&mut session, "updating firmware")?;
    session.update_firmware(&data)?;
    pb.finish_with_message("Firmware updated");

    println!("Reconnect the adapter to start the new firmware");
    Ok(())
}
