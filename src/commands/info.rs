//! Info and reset commands

use super::{connect, format_size, Target};

/// Connect and print what was found
pub fn run_info(target: &Target<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = connect(target)?;

    println!("Adapter information:");
    if let Some(port) = session.port() {
        println!("  Port:     {}", port);
    }
    if let Some(adapter) = session.adapter() {
        println!("  Adapter:  {}", adapter);
    }
    if let Some(version) = session.firmware_version() {
        println!("  Firmware: 0x{:02x}", version);
    }
    if let Some(mode) = session.mode() {
        println!("  Mode:     {}", mode);
    }

    if let Some(dev) = session.device().cloned() {
        println!();
        println!("Target information:");
        println!("  Device:   {}", dev.name);
        println!("  Family:   0x{:02X}", dev.family);
        if let Some(rev) = dev.revision {
            println!("  Revision: 0x{:02X}", rev);
        }
        println!(
            "  Flash:    {} in {} sectors",
            format_size(dev.flash_size),
            format_size(dev.sector_size)
        );
        if let Some(reserved) = dev.reserved {
            println!(
                "  Reserved: 0x{:05X}-0x{:05X}",
                reserved.bottom, reserved.top
            );
        }
        if let Some(sp) = dev.scratchpad {
            println!(
                "  Scratch:  {} at 0x{:04X}",
                format_size(sp.len),
                sp.start
            );
        }
        println!("  XRAM:     {}", format_size(dev.xram_size));
        println!("  PC:       0x{:04X}", session.read_pc()?);
    }

    Ok(())
}

/// Reset the target core
pub fn run_reset(target: &Target<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = connect(target)?;
    session.reset_target()?;
    println!("Target reset, PC = 0x{:04X}", session.read_pc()?);
    Ok(())
}
