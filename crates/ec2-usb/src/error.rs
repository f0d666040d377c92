//! Error types for the USB transport

use thiserror::Error;

/// USB transport errors
#[derive(Debug, Error)]
pub enum UsbError {
    /// No matching adapter is attached
    #[error("EC3 adapter not found (VID:10c4 PID:8044){}", .serial.as_ref().map(|s| format!(" with serial {}", s)).unwrap_or_default())]
    DeviceNotFound {
        /// Serial number that was asked for
        serial: Option<String>,
    },

    /// The adapter could not be opened
    #[error("failed to open EC3: {0}")]
    OpenFailed(String),

    /// The interface could not be claimed
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// A transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// The adapter did not answer within the timeout
    #[error("timeout during USB transfer")]
    Timeout,

    /// A packet's length prefix does not match its contents
    #[error("malformed packet: {0}")]
    InvalidPacket(String),

    /// The payload does not fit one packet
    #[error("payload of {0} bytes exceeds one packet")]
    PayloadTooLarge(usize),

    /// The transport was already closed
    #[error("adapter already released")]
    Closed,
}

/// Result type for USB operations
pub type Result<T> = core::result::Result<T, UsbError>;

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}

impl From<UsbError> for ec2_core::Error {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::DeviceNotFound { .. } | UsbError::OpenFailed(_) | UsbError::ClaimFailed(_) => {
                ec2_core::Error::TransportOpen(e.to_string())
            }
            UsbError::Timeout => ec2_core::Error::Timeout,
            _ => ec2_core::Error::Io(e.to_string()),
        }
    }
}
