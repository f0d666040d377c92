//! List commands implementation

use ec2_core::DeviceDb;

use super::format_size;

/// List attached adapters
pub fn list_adapters() -> Result<(), Box<dyn std::error::Error>> {
    println!("Compiled-in adapters: {}", crate::adapters::available_adapters().join(", "));
    println!();

    #[cfg(feature = "usb")]
    {
        let adapters = ec2_usb::list_adapters()?;
        if adapters.is_empty() {
            println!("No EC3 adapters found");
        } else {
            println!("{:<6} {:<8} {}", "Bus", "Address", "Serial");
            println!("{}", "-".repeat(40));
            for a in &adapters {
                println!(
                    "{:<6} {:<8} {}",
                    a.bus,
                    a.address,
                    a.serial.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("Use -p USB:<serial> to select one");
        }
    }

    #[cfg(feature = "serial")]
    println!("EC2 adapters are opened by serial device path, e.g. -p /dev/ttyS0");

    Ok(())
}

/// List known devices
pub fn list_devices(db: &DeviceDb, name_filter: Option<&str>) {
    println!("Known devices:");
    println!();
    println!(
        "{:<16} {:>6} {:>9} {:>7} {:>8} {:>7} {:>6}",
        "Name", "Mode", "Flash", "Sector", "XRAM", "Scratch", "Tested"
    );
    println!("{}", "-".repeat(66));

    for dev in db.devices() {
        if let Some(filter) = name_filter {
            if !dev.name.to_lowercase().contains(&filter.to_lowercase()) {
                continue;
            }
        }

        let scratch = dev
            .scratchpad
            .map(|s| format_size(s.len))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<16} {:>6} {:>9} {:>7} {:>8} {:>7} {:>6}",
            dev.name,
            dev.mode.to_string(),
            format_size(dev.flash_size),
            format_size(dev.sector_size),
            format_size(dev.xram_size),
            scratch,
            if dev.tested { "yes" } else { "no" }
        );
    }
}
