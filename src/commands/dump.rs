//! Data memory dump

use super::{connect, Target};
use crate::cli::Space;

/// Default start address and size of each space
fn space_window(space: Space, xram_size: u32) -> (u32, u32) {
    match space {
        Space::Ram => (0x00, 0x100),
        Space::Sfr => (0x80, 0x80),
        Space::Xdata => (0x0000, xram_size.min(0x10000)),
    }
}

/// Classic 16-bytes-per-line hex dump
fn hexdump(base: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:04x}: {:<47}  {}\n",
            base as usize + i * 16,
            hex.join(" "),
            ascii
        ));
    }
    out
}

/// Hex-dump part of RAM, the SFR space or XDATA
pub fn run_dump(
    target: &Target<'_>,
    space: Space,
    start: Option<u32>,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = connect(target)?;
    let xram = session.device().map(|d| d.xram_size).unwrap_or(0);
    let (default_start, default_len) = space_window(space, xram);
    let start = start.unwrap_or(default_start);
    let len = length.unwrap_or_else(|| (default_start + default_len).saturating_sub(start));

    let mut data = vec![0u8; len as usize];
    match space {
        Space::Ram => session.read_ram(u8::try_from(start)?, &mut data)?,
        Space::Sfr => session.read_sfrs(u8::try_from(start)?, &mut data)?,
        Space::Xdata => session.read_xdata(u16::try_from(start)?, &mut data)?,
    }
    print!("{}", hexdump(start, &data));
    Ok(())
}
