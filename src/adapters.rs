//! Adapter registry
//!
//! Maps a parsed port identifier to the transport crate that handles it.
//! Each adapter kind is behind its own cargo feature.

use ec2_core::{Connector, Error, PortSpec, Transport};

/// Opens serial and USB adapters, as enabled at compile time
pub struct AdapterConnector;

impl Connector for AdapterConnector {
    fn open(&self, port: &PortSpec) -> ec2_core::Result<Box<dyn Transport>> {
        match port {
            #[cfg(feature = "serial")]
            PortSpec::Serial(path) => Ok(Box::new(ec2_serial::SerialTransport::open(path)?)),
            #[cfg(feature = "usb")]
            PortSpec::Usb { serial } => {
                Ok(Box::new(ec2_usb::UsbTransport::open(serial.as_deref())?))
            }
            #[allow(unreachable_patterns)]
            _ => Err(Error::TransportOpen(format!(
                "{} support not compiled in (port {})",
                port.adapter(),
                port
            ))),
        }
    }
}

/// Names of the adapter kinds enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_adapters() -> Vec<&'static str> {
    let mut adapters = Vec::new();

    #[cfg(feature = "serial")]
    adapters.push("EC2 (serial)");

    #[cfg(feature = "usb")]
    adapters.push("EC3 (USB)");

    adapters
}
