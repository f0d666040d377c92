//! Error types for the serial transport

use thiserror::Error;

/// Serial transport errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// The port could not be opened or configured
    #[error("failed to open {port}: {source}")]
    Open {
        /// Device path
        port: String,
        /// Underlying error
        #[source]
        source: serialport::Error,
    },

    /// Control line or buffer operation failed
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// The adapter stopped answering mid-read
    #[error("read timed out after {received} of {expected} bytes")]
    Timeout {
        /// Bytes requested
        expected: usize,
        /// Bytes received before the timeout
        received: usize,
    },

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for serial operations
pub type Result<T> = core::result::Result<T, SerialError>;

impl From<SerialError> for ec2_core::Error {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::Open { .. } => ec2_core::Error::TransportOpen(e.to_string()),
            SerialError::Timeout { .. } => ec2_core::Error::Timeout,
            SerialError::Io(io) => io.into(),
            SerialError::Port(_) => ec2_core::Error::Io(e.to_string()),
        }
    }
}
