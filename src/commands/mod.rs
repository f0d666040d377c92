//! CLI command implementations
//!
//! Every command except the two `list` ones opens a [`Session`] through
//! [`connect`], does its work and lets the session drop, which detaches the
//! target and closes the adapter.

mod dump;
mod firmware;
mod flash;
mod info;
mod list;
mod run;

pub use dump::run_dump;
pub use firmware::run_firmware;
pub use flash::{
    run_erase, run_read, run_scratchpad_erase, run_scratchpad_read, run_scratchpad_write,
    run_write,
};
pub use info::{run_info, run_reset};
pub use list::{list_adapters, list_devices};
pub use run::run_until_breakpoint;

use ec2_core::{DeviceDb, Mode, Session};
use indicatif::{ProgressBar, ProgressStyle};

use crate::adapters::AdapterConnector;

/// Common connection options
pub struct Target<'a> {
    /// Port identifier as given on the command line
    pub port: &'a str,
    /// Requested debug interface
    pub mode: Mode,
    /// Log the raw protocol bytes
    pub trace: bool,
    /// Device definitions
    pub db: &'a DeviceDb,
}

/// Open a session and attach to the target
pub fn connect(target: &Target<'_>) -> Result<Session, Box<dyn std::error::Error>> {
    let mut session = Session::new(target.mode);
    session.set_trace(target.trace);
    session.connect(target.port, &AdapterConnector, target.db)?;
    if let (Some(adapter), Some(version)) = (session.adapter(), session.firmware_version()) {
        log::info!("{} firmware version 0x{:02x}", adapter, version);
    }
    if let Some(device) = session.device() {
        log::info!("Found {}", device);
        if !device.tested {
            log::warn!("{} support is untested", device.name);
        }
    }
    Ok(session)
}

/// Percent progress bar fed by the session's progress callback
fn attach_progress(session: &mut Session, message: &'static str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    let bar = pb.clone();
    session.set_progress_callback(Box::new(move |percent| bar.set_position(percent as u64)));
    Ok(pb)
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
