//! EC3 device implementation

use std::collections::VecDeque;
use std::time::Duration;

use ec2_core::{AdapterKind, Transport};
use nusb::transfer::{Buffer, ControlOut, ControlType, In, Interrupt, Out, Recipient, TransferError};
use nusb::{Endpoint, Interface, MaybeFuture};

use crate::error::{Result, UsbError};
use crate::protocol::*;

const TIMEOUT: Duration = Duration::from_millis(USB_TIMEOUT_MS);

/// Attached EC3 adapter
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// Serial-number string
    pub serial: Option<String>,
}

/// List attached EC3 adapters
pub fn list_adapters() -> Result<Vec<AdapterInfo>> {
    let adapters = nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == EC3_VENDOR_ID && d.product_id() == EC3_PRODUCT_ID)
        .map(|d| AdapterInfo {
            bus: d.busnum(),
            address: d.device_address(),
            serial: d.serial_number().map(str::to_string),
        })
        .collect();
    Ok(adapters)
}

/// Claimed interface and its endpoints; dropping it releases the interface
struct Claimed {
    interface: Interface,
    out_ep: Endpoint<Interrupt, Out>,
    in_ep: Endpoint<Interrupt, In>,
}

/// USB connection to an EC3
pub struct UsbTransport {
    device: nusb::Device,
    claimed: Option<Claimed>,
    /// Reply bytes received but not yet consumed
    pending: VecDeque<u8>,
    serial: Option<String>,
}

impl UsbTransport {
    /// Open the first EC3, or the one with the given serial number
    pub fn open(serial: Option<&str>) -> Result<Self> {
        let info = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == EC3_VENDOR_ID && d.product_id() == EC3_PRODUCT_ID)
            .find(|d| serial.map_or(true, |s| d.serial_number() == Some(s)))
            .ok_or_else(|| UsbError::DeviceNotFound {
                serial: serial.map(str::to_string),
            })?;

        log::info!(
            "Opening EC3 at bus {} address {}",
            info.busnum(),
            info.device_address()
        );

        let device = info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
        if let Err(e) = device.set_configuration(CONFIGURATION).wait() {
            // already configured by the OS on most hosts
            log::debug!("set configuration {}: {}", CONFIGURATION, e);
        }
        let interface = device
            .detach_and_claim_interface(INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let out_ep = interface
            .endpoint::<Interrupt, Out>(WRITE_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Interrupt, In>(READ_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            device,
            claimed: Some(Claimed {
                interface,
                out_ep,
                in_ep,
            }),
            pending: VecDeque::new(),
            serial: info.serial_number().map(str::to_string),
        })
    }

    /// Serial-number string of the opened adapter
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn claimed(&mut self) -> Result<&mut Claimed> {
        self.claimed.as_mut().ok_or(UsbError::Closed)
    }

    fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let packet = frame(payload)?;
        let mut buf = Buffer::new(packet.len());
        buf.extend_from_slice(&packet);
        self.claimed()?
            .out_ep
            .transfer_blocking(buf, TIMEOUT)
            .into_result()
            .map_err(map_transfer)?;
        log::trace!("USB write {} bytes", packet.len());
        Ok(())
    }

    fn read_packet(&mut self) -> Result<()> {
        let in_ep = &mut self.claimed()?.in_ep;
        let mut buf = Buffer::new(PACKET_SIZE);
        buf.set_requested_len(PACKET_SIZE);
        let data = in_ep
            .transfer_blocking(buf, TIMEOUT)
            .into_result()
            .map_err(map_transfer)?;
        let payload = unframe(&data)?;
        log::trace!("USB read {} bytes", payload.len());
        self.pending.extend(payload);
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(mut claimed) = self.claimed.take() else {
            return Ok(());
        };
        claimed
            .interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: SHUTDOWN_REQUEST,
                    value: SHUTDOWN_VALUE,
                    index: SHUTDOWN_INDEX,
                    data: &SHUTDOWN_REPORT,
                },
                TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbError::TransferFailed(format!("shutdown request: {}", e)))?;

        // the adapter answers the shutdown with one report
        let mut buf = Buffer::new(PACKET_SIZE);
        buf.set_requested_len(PACKET_SIZE);
        if let Err(e) = claimed.in_ep.transfer_blocking(buf, TIMEOUT).into_result() {
            log::debug!("shutdown drain: {}", e);
        }

        drop(claimed);
        self.device
            .reset()
            .wait()
            .map_err(|e| UsbError::TransferFailed(format!("reset: {}", e)))?;
        self.pending.clear();
        log::debug!("EC3 released");
        Ok(())
    }
}

fn map_transfer(e: TransferError) -> UsbError {
    match e {
        TransferError::Cancelled => UsbError::Timeout,
        e => UsbError::TransferFailed(e.to_string()),
    }
}

impl Transport for UsbTransport {
    fn adapter(&self) -> AdapterKind {
        AdapterKind::Usb
    }

    fn write(&mut self, data: &[u8]) -> ec2_core::Result<()> {
        // leftovers of an earlier reply would be taken for this one
        self.pending.clear();
        Ok(self.write_packet(data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> ec2_core::Result<()> {
        while self.pending.len() < buf.len() {
            self.read_packet()?;
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn flush_input(&mut self) -> ec2_core::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn flush_output(&mut self) -> ec2_core::Result<()> {
        Ok(())
    }

    fn reset_adapter(&mut self) -> ec2_core::Result<()> {
        // no reset line; a fresh session starts in the boot-loader
        log::debug!("EC3 has no reset line, skipping adapter reset");
        Ok(())
    }

    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    fn close(&mut self) -> ec2_core::Result<()> {
        Ok(self.shutdown()?)
    }
}
