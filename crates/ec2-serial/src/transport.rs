//! Serial port transport

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use ec2_core::{AdapterKind, Transport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Result, SerialError};

/// Fixed line speed of the adapter
pub const BAUD_RATE: u32 = 115_200;

/// How long a read waits for the adapter
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

const RESET_PULSE: Duration = Duration::from_micros(100);
const RESET_SETTLE: Duration = Duration::from_millis(10);

/// Serial connection to an EC2
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open and configure the serial device at `path`
    ///
    /// DTR and RTS are asserted, which powers the adapter's line driver and
    /// releases its reset.
    pub fn open(path: &str) -> Result<Self> {
        let mut port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| SerialError::Open {
                port: path.to_string(),
                source,
            })?;

        port.write_data_terminal_ready(true)?;
        port.write_request_to_send(true)?;
        log::info!("Opened serial port {} at {} baud", path, BAUD_RATE);

        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    /// Device path
    pub fn name(&self) -> &str {
        &self.name
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        // stale input would be taken for the reply
        self.port.clear(ClearBuffer::All)?;
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        read_reply(&mut self.port, buf)
    }

    fn pulse_reset(&mut self) -> Result<()> {
        thread::sleep(RESET_PULSE);
        self.port.write_data_terminal_ready(false)?;
        thread::sleep(RESET_PULSE);
        self.port.write_data_terminal_ready(true)?;
        // the boot-loader needs about 8 ms before it answers
        thread::sleep(RESET_SETTLE);
        Ok(())
    }
}

/// Fill `buf` from `reader`
///
/// A read that times out or returns no bytes ends the reply; a port that
/// was unplugged reports end-of-file rather than blocking.
fn read_reply<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut received = 0;
    while received < buf.len() {
        match reader.read(&mut buf[received..]) {
            Ok(0) => {
                return Err(SerialError::Timeout {
                    expected: buf.len(),
                    received,
                });
            }
            Ok(n) => received += n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(SerialError::Timeout {
                    expected: buf.len(),
                    received,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl Transport for SerialTransport {
    fn adapter(&self) -> AdapterKind {
        AdapterKind::Serial
    }

    fn write(&mut self, data: &[u8]) -> ec2_core::Result<()> {
        Ok(self.send_bytes(data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> ec2_core::Result<()> {
        Ok(self.recv_exact(buf)?)
    }

    fn flush_input(&mut self) -> ec2_core::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(SerialError::from)?;
        Ok(())
    }

    fn flush_output(&mut self) -> ec2_core::Result<()> {
        self.port.clear(ClearBuffer::Output).map_err(SerialError::from)?;
        Ok(())
    }

    fn reset_adapter(&mut self) -> ec2_core::Result<()> {
        log::debug!("resetting EC2 on {}", self.name);
        Ok(self.pulse_reset()?)
    }

    fn close(&mut self) -> ec2_core::Result<()> {
        log::debug!("closing {}", self.name);
        self.port
            .write_data_terminal_ready(false)
            .map_err(SerialError::from)?;
        Ok(())
    }
}
