//! ec2-usb - USB transport for the EC3 debug adapter
//!
//! The EC3 enumerates as a HID-class device and moves the same command bytes
//! as the serial EC2, wrapped in length-prefixed interrupt packets. It has no
//! reset line; instead a session must be shut down with a class request and
//! a USB reset so the next one starts from the boot-loader.

pub mod device;
pub mod error;
pub mod protocol;

pub use device::{list_adapters, AdapterInfo, UsbTransport};
pub use error::{Result, UsbError};
pub use protocol::{EC3_PRODUCT_ID, EC3_VENDOR_ID};
