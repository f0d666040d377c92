//! EC3 USB constants and packet framing
//!
//! Every interrupt packet starts with one byte giving the number of payload
//! bytes that follow, in both directions.

use crate::error::{Result, UsbError};

// USB device identifiers
/// Silicon Labs vendor id
pub const EC3_VENDOR_ID: u16 = 0x10C4;
/// EC3 product id
pub const EC3_PRODUCT_ID: u16 = 0x8044;

/// Configuration selected on open
pub const CONFIGURATION: u8 = 1;
/// Interface carrying the debug protocol
pub const INTERFACE: u8 = 0;

// Interrupt endpoints
/// Interrupt OUT endpoint for commands
pub const WRITE_EP: u8 = 0x02;
/// Interrupt IN endpoint for replies
pub const READ_EP: u8 = 0x81;

/// Full interrupt packet size
pub const PACKET_SIZE: usize = 64;
/// Largest payload after the length byte
pub const MAX_PAYLOAD: usize = PACKET_SIZE - 1;

/// USB I/O timeout in milliseconds
pub const USB_TIMEOUT_MS: u64 = 1000;

// Shutdown handshake: HID SET_REPORT to the interface
/// Class request code
pub const SHUTDOWN_REQUEST: u8 = 0x09;
/// Request value (output report 0x40)
pub const SHUTDOWN_VALUE: u16 = 0x0340;
/// Request index
pub const SHUTDOWN_INDEX: u16 = 0;
/// Report contents
pub const SHUTDOWN_REPORT: [u8; 4] = [0x40, 0x02, 0x0d, 0x0d];

/// Build an OUT packet: length byte followed by the payload
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(UsbError::PayloadTooLarge(payload.len()));
    }
    let mut packet = Vec::with_capacity(payload.len() + 1);
    packet.push(payload.len() as u8);
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Payload of an IN packet
pub fn unframe(packet: &[u8]) -> Result<&[u8]> {
    let (&len, rest) = packet
        .split_first()
        .ok_or_else(|| UsbError::InvalidPacket("empty packet".into()))?;
    rest.get(..len as usize).ok_or_else(|| {
        UsbError::InvalidPacket(format!(
            "length byte {} but only {} bytes follow",
            len,
            rest.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame() {
        assert_eq!(frame(&[0x06, 0x00, 0x00]).unwrap(), vec![3, 0x06, 0x00, 0x00]);
        assert_eq!(frame(&[]).unwrap(), vec![0]);
        assert_eq!(frame(&[0xAA; MAX_PAYLOAD]).unwrap().len(), PACKET_SIZE);
        assert!(matches!(
            frame(&[0; PACKET_SIZE]),
            Err(UsbError::PayloadTooLarge(64))
        ));
    }

    #[test]
    fn test_unframe_ignores_padding() {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = 2;
        packet[1] = 0x0D;
        packet[2] = 0x01;
        assert_eq!(unframe(&packet).unwrap(), &[0x0D, 0x01]);
    }

    #[test]
    fn test_unframe_rejects_short() {
        assert!(unframe(&[]).is_err());
        assert!(unframe(&[5, 1, 2]).is_err());
    }
}
