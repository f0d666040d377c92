//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use ec2_core::Mode;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "ec2flash")]
#[command(author, version, about = "Silicon Labs EC2/EC3 debug adapter tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Adapter port: a serial device path, `USB`, or `USB:<serial>`
    #[arg(short, long, default_value = "USB", global = true)]
    pub port: String,

    /// Debug interface of the target
    #[arg(short, long, value_enum, default_value_t = ModeArg::Auto, global = true)]
    pub mode: ModeArg,

    /// Log every byte sent to and received from the adapter
    #[arg(long, global = true)]
    pub debug: bool,

    /// Extra device definitions (RON file)
    #[arg(long, global = true)]
    pub device_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Debug interface selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Try C2, fall back to JTAG
    Auto,
    /// JTAG
    Jtag,
    /// C2
    C2,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Auto => Mode::Auto,
            ModeArg::Jtag => Mode::Jtag,
            ModeArg::C2 => Mode::C2,
        }
    }
}

/// How `write` treats the sectors it touches
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Program only; the range must already be erased
    Raw,
    /// Erase the touched sectors first, losing their other contents
    Erase,
    /// Preserve the rest of the touched sectors
    #[default]
    Keep,
}

/// Data address space for `dump`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// Internal RAM
    Ram,
    /// Special function registers
    Sfr,
    /// External data space
    Xdata,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect and show adapter and target information
    Info,

    /// Read code flash to a file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes (default: up to the reserved area or end of flash)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Write a binary file to code flash
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Sector handling
        #[arg(long, value_enum, default_value_t = WriteStrategy::Keep)]
        strategy: WriteStrategy,

        /// Read back and compare after writing
        #[arg(long)]
        verify: bool,
    },

    /// Erase one sector, or all code flash
    Erase {
        /// Erase only the sector containing this address
        #[arg(long, value_parser = parse_hex_u32)]
        sector: Option<u32>,
    },

    /// Scratch-pad flash operations
    #[command(subcommand)]
    Scratchpad(ScratchpadCommands),

    /// Hex-dump a data address space
    Dump {
        /// Address space
        #[arg(value_enum)]
        space: Space,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        start: Option<u32>,

        /// Number of bytes
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Reset the target core
    Reset,

    /// Run the target until a breakpoint is hit
    Run {
        /// Breakpoint address (repeatable, at most 4)
        #[arg(short, long = "breakpoint", value_parser = parse_hex_u32)]
        breakpoints: Vec<u32>,

        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Reset the core before running
        #[arg(long)]
        reset: bool,
    },

    /// Reprogram the adapter's own firmware
    Firmware {
        /// Firmware image
        #[arg(short, long)]
        image: PathBuf,
    },

    /// List attached USB adapters
    ListAdapters,

    /// List known devices
    ListDevices {
        /// Filter by name
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ScratchpadCommands {
    /// Read the whole scratch-pad to a file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a file into the scratch-pad
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Offset inside the scratch-pad
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Program only; do not preserve the rest of the scratch-pad
        #[arg(long)]
        raw: bool,
    },

    /// Erase the scratch-pad
    Erase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x1F00"), Ok(0x1F00));
        assert_eq!(parse_hex_u32("0X10"), Ok(0x10));
        assert_eq!(parse_hex_u32("512"), Ok(512));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "ec2flash", "-p", "/dev/ttyS0", "-m", "jtag", "write", "-i", "app.bin", "--start",
            "0x400", "--strategy", "erase",
        ])
        .unwrap();
        assert_eq!(cli.port, "/dev/ttyS0");
        assert_eq!(Mode::from(cli.mode), Mode::Jtag);
        match cli.command {
            Commands::Write {
                start, strategy, ..
            } => {
                assert_eq!(start, 0x400);
                assert_eq!(strategy, WriteStrategy::Erase);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_run_breakpoints() {
        let cli = Cli::try_parse_from(["ec2flash", "run", "-b", "0x100", "-b", "0x200"]).unwrap();
        match cli.command {
            Commands::Run { breakpoints, .. } => assert_eq!(breakpoints, vec![0x100, 0x200]),
            _ => panic!("wrong command"),
        }
    }
}
