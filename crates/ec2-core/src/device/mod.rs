//! Target device descriptors and database
//!
//! A descriptor is looked up by identification value once the target is
//! connected and is shared read-only by the session afterwards.

mod builtin;
mod database;
mod types;

pub use builtin::builtin_devices;
pub use database::DeviceDb;
pub use types::*;
