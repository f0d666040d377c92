//! ec2-serial - Serial transport for the EC2 debug adapter
//!
//! The EC2 is attached through an RS-232 port running at 115200 baud, 8N1,
//! without flow control. Its DTR line doubles as the adapter's reset input:
//! dropping it briefly restarts the adapter in its boot-loader.
//!
//! # Example
//!
//! ```no_run
//! use ec2_core::Transport;
//! use ec2_serial::SerialTransport;
//!
//! let mut transport = SerialTransport::open("/dev/ttyS0")?;
//! transport.reset_adapter()?;
//! # Ok::<(), ec2_core::Error>(())
//! ```

pub mod error;
pub mod transport;

pub use error::{Result, SerialError};
pub use transport::{SerialTransport, BAUD_RATE, READ_TIMEOUT};
