//! Code and scratch-pad flash commands

use std::fs;
use std::path::Path;

use ec2_core::{DeviceDescriptor, Session};

use super::{attach_progress, connect, Target};
use crate::cli::WriteStrategy;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn device(session: &Session) -> Result<DeviceDescriptor, Box<dyn std::error::Error>> {
    session
        .device()
        .cloned()
        .ok_or_else(|| "no target device attached".into())
}

/// Bytes from `start` up to the reserved area, or to the end of flash
fn default_read_len(dev: &DeviceDescriptor, start: u32) -> u32 {
    let end = match dev.reserved {
        Some(r) if r.bottom > start => r.bottom,
        _ => dev.flash_size,
    };
    end.saturating_sub(start)
}

/// Read code flash to a file
pub fn run_read(target: &Target<'_>, output: &Path, start: u32, length: Option<u32>) -> CmdResult {
    let mut session = connect(target)?;
    let dev = device(&session)?;
    let len = length.unwrap_or_else(|| default_read_len(&dev, start));

    log::info!("Reading 0x{:x} bytes from 0x{:05x}", len, start);
    let pb = attach_progress(&mut session, "reading")?;
    let mut data = vec![0u8; len as usize];
    session.read_flash(start, &mut data)?;
    pb.finish_with_message("Read complete");

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Write a file to code flash
pub fn run_write(
    target: &Target<'_>,
    input: &Path,
    start: u32,
    strategy: WriteStrategy,
    verify: bool,
) -> CmdResult {
    let data = fs::read(input)?;
    let mut session = connect(target)?;

    log::info!(
        "Writing {} bytes at 0x{:05x} ({:?})",
        data.len(),
        start,
        strategy
    );
    let pb = attach_progress(&mut session, "writing")?;
    match strategy {
        WriteStrategy::Raw => session.write_flash(start, &data)?,
        WriteStrategy::Erase => session.write_flash_auto_erase(start, &data)?,
        WriteStrategy::Keep => session.write_flash_auto_keep(start, &data)?,
    }
    pb.finish_with_message("Write complete");

    if verify {
        let pb = attach_progress(&mut session, "verifying")?;
        let mut readback = vec![0u8; data.len()];
        session.read_flash(start, &mut readback)?;
        pb.finish_and_clear();
        if let Some(i) = data.iter().zip(&readback).position(|(a, b)| a != b) {
            return Err(format!(
                "verify failed at 0x{:05x}: expected 0x{:02x}, read 0x{:02x}",
                start + i as u32,
                data[i],
                readback[i]
            )
            .into());
        }
        println!("Verified");
    }
    Ok(())
}

/// Erase one sector or all of code flash
pub fn run_erase(target: &Target<'_>, sector: Option<u32>) -> CmdResult {
    let mut session = connect(target)?;
    match sector {
        Some(addr) => {
            session.erase_flash_sector(addr)?;
            println!("Erased sector containing 0x{:05x}", addr);
        }
        None => {
            session.erase_flash()?;
            println!("Erased code flash");
        }
    }
    Ok(())
}

/// Read the scratch-pad to a file
pub fn run_scratchpad_read(target: &Target<'_>, output: &Path) -> CmdResult {
    let mut session = connect(target)?;
    let dev = device(&session)?;
    let sp = dev
        .scratchpad
        .ok_or_else(|| format!("{} has no scratch-pad", dev.name))?;

    let mut data = vec![0u8; sp.len as usize];
    session.read_scratchpad(0, &mut data)?;
    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Write a file into the scratch-pad
pub fn run_scratchpad_write(target: &Target<'_>, input: &Path, offset: u32, raw: bool) -> CmdResult {
    let data = fs::read(input)?;
    let mut session = connect(target)?;
    if raw {
        session.write_scratchpad(offset, &data)?;
    } else {
        let pb = attach_progress(&mut session, "merging")?;
        session.write_scratchpad_merge(offset, &data)?;
        pb.finish_with_message("Write complete");
    }
    println!("Wrote {} bytes to scratch-pad offset 0x{:x}", data.len(), offset);
    Ok(())
}

/// Erase the scratch-pad
pub fn run_scratchpad_erase(target: &Target<'_>) -> CmdResult {
    let mut session = connect(target)?;
    session.erase_scratchpad()?;
    println!("Erased scratch-pad");
    Ok(())
}
