//! ec2-core - Protocol engine for Silicon Labs EC2/EC3 debug adapters
//!
//! This crate drives the serial-attached EC2 and the USB-attached EC3 in-circuit
//! debug adapters and the 8051 target behind them. It provides memory and
//! register access, flash programming, execution control and hardware
//! breakpoints over either of the two debug interfaces the silicon exposes
//! (JTAG and C2).
//!
//! Byte transports are supplied by the `ec2-serial` and `ec2-usb` crates
//! through the [`Transport`] and [`Connector`] traits.
//!
//! # Example
//!
//! ```ignore
//! use ec2_core::{DeviceDb, Mode, Session};
//!
//! fn dump_pc(connector: &dyn ec2_core::Connector) -> ec2_core::Result<()> {
//!     let db = DeviceDb::builtin();
//!     let mut session = Session::new(Mode::Auto);
//!     session.connect("USB", connector, &db)?;
//!     println!("PC = 0x{:04x}", session.read_pc()?);
//!     session.disconnect();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod boot;
pub mod breakpoint;
pub mod device;
pub mod error;
pub mod firmware;
pub mod flash;
pub mod link;
pub mod mode;
pub mod paging;
pub mod progress;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use breakpoint::{Breakpoint, Breakpoints, SlotMask};
pub use device::{DebugMode, DeviceDb, DeviceDescriptor};
pub use error::{AddressSpace, Error, Result};
pub use session::{ConnectionState, Mode, PagedRegister, Session};
pub use transport::{AdapterKind, Connector, PortSpec, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
