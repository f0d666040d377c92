//! ec2flash - Silicon Labs EC2/EC3 debug adapter tool
//!
//! Reads, writes and erases the flash of 8051 microcontrollers behind an
//! EC2 (serial) or EC3 (USB) in-circuit debug adapter, dumps their data
//! memory, runs them to hardware breakpoints and updates the adapter's own
//! firmware.
//!
//! The protocol work lives in `ec2-core`; the adapter transports live in
//! `ec2-serial` and `ec2-usb`, each behind a cargo feature.

mod adapters;
mod cli;
mod commands;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, ScratchpadCommands};
use commands::Target;
use ec2_core::DeviceDb;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }
    if cli.debug && cli.verbose < 2 {
        // protocol bytes are logged at trace level
        log::set_max_level(log::LevelFilter::Trace);
    }
    log::debug!("ec2flash {} (core {})", env!("CARGO_PKG_VERSION"), ec2_core::VERSION);

    // Load device database
    let db = match load_device_database(cli.device_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load device database: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} device definitions", db.len());

    let target = Target {
        port: &cli.port,
        mode: cli.mode.into(),
        trace: cli.debug,
        db: &db,
    };

    let result = match cli.command {
        Commands::Info => commands::run_info(&target),
        Commands::Read {
            output,
            start,
            length,
        } => commands::run_read(&target, &output, start, length),
        Commands::Write {
            input,
            start,
            strategy,
            verify,
        } => commands::run_write(&target, &input, start, strategy, verify),
        Commands::Erase { sector } => commands::run_erase(&target, sector),
        Commands::Scratchpad(sub) => match sub {
            ScratchpadCommands::Read { output } => commands::run_scratchpad_read(&target, &output),
            ScratchpadCommands::Write { input, offset, raw } => {
                commands::run_scratchpad_write(&target, &input, offset, raw)
            }
            ScratchpadCommands::Erase => commands::run_scratchpad_erase(&target),
        },
        Commands::Dump {
            space,
            start,
            length,
        } => commands::run_dump(&target, space, start, length),
        Commands::Reset => commands::run_reset(&target),
        Commands::Run {
            breakpoints,
            timeout,
            reset,
        } => commands::run_until_breakpoint(
            &target,
            &breakpoints,
            Duration::from_secs(timeout),
            reset,
        ),
        Commands::Firmware { image } => commands::run_firmware(&target, &image),
        Commands::ListAdapters => commands::list_adapters(),
        Commands::ListDevices { name } => {
            commands::list_devices(&db, name.as_deref());
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        if e
            .downcast_ref::<ec2_core::Error>()
            .is_some_and(ec2_core::Error::is_rejected_request)
        {
            log::info!("Request rejected before reaching the target, nothing was changed");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Built-in devices plus the definitions in `path`, if given
fn load_device_database(path: Option<&Path>) -> ec2_core::Result<DeviceDb> {
    let mut db = DeviceDb::builtin();
    if let Some(path) = path {
        let count = db.load_file(path)?;
        log::info!("Loaded {} device definitions from {:?}", count, path);
    }
    Ok(db)
}
