//! Command/response engine
//!
//! Every adapter command is a write followed by a fixed-length read. Most
//! replies must match an expected byte pattern exactly; a few return data.
//! [`Link::exchange`] is the primitive everything else is built on.

use crate::error::{Error, Result};
use crate::transport::{AdapterKind, Transport};

/// One step of a scripted exchange: bytes to send, bytes expected back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Command bytes
    pub tx: &'static [u8],
    /// Exact reply
    pub rx: &'static [u8],
}

impl Step {
    /// Create a step
    pub const fn new(tx: &'static [u8], rx: &'static [u8]) -> Self {
        Self { tx, rx }
    }
}

/// A failed step of a scripted exchange
#[derive(Debug)]
pub struct StepFailure {
    /// Position of the step in the script
    pub index: usize,
    /// Why it failed
    pub error: Error,
}

/// An ordered list of exchanges sent as one named operation
#[derive(Debug, Clone, Copy)]
pub struct Script {
    /// Name used in log messages
    pub name: &'static str,
    /// Steps, executed strictly in order
    pub steps: &'static [Step],
}

impl Script {
    /// Create a script
    pub const fn new(name: &'static str, steps: &'static [Step]) -> Self {
        Self { name, steps }
    }

    /// Run every step, stopping at the first failure
    pub fn run(&self, link: &mut Link) -> Result<()> {
        log::trace!("script {}: {} steps", self.name, self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            link.exchange(step.tx, step.rx).map_err(|e| {
                log::debug!("script {}: step {} failed: {}", self.name, index, e);
                e
            })?;
        }
        Ok(())
    }

    /// Run every step regardless of failures and report which ones failed
    ///
    /// Only for sequences that deliberately probe adapter state, where a
    /// differing reply carries no meaning for the steps that follow.
    pub fn run_all(&self, link: &mut Link) -> Vec<StepFailure> {
        let mut failures = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let Err(error) = link.exchange(step.tx, step.rx) {
                log::debug!("script {}: step {} differs: {}", self.name, index, error);
                failures.push(StepFailure { index, error });
            }
        }
        failures
    }
}

/// Command/response link to an adapter
///
/// Owns the transport; closing the link releases the adapter.
pub struct Link {
    transport: Box<dyn Transport>,
    trace: bool,
    closed: bool,
}

impl Link {
    /// Wrap an open transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            trace: false,
            closed: false,
        }
    }

    /// Log wire traffic at debug level instead of trace
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Kind of adapter behind this link
    pub fn adapter(&self) -> AdapterKind {
        self.transport.adapter()
    }

    /// Largest payload a single write may carry
    pub fn max_payload(&self) -> usize {
        self.transport.max_payload()
    }

    /// Send `tx` and require the reply to equal `expected` byte-for-byte
    ///
    /// No retry: a timeout or mismatch is reported to the caller.
    pub fn exchange(&mut self, tx: &[u8], expected: &[u8]) -> Result<()> {
        self.send(tx)?;
        self.expect(expected)
    }

    /// Read `expected.len()` bytes and require them to equal `expected`
    pub fn expect(&mut self, expected: &[u8]) -> Result<()> {
        let mut received = vec![0u8; expected.len()];
        self.receive(&mut received)?;
        if received != expected {
            return Err(Error::ProtocolMismatch {
                expected: expected.to_vec(),
                received,
            });
        }
        Ok(())
    }

    /// Send `tx` and read exactly `buf.len()` reply bytes
    pub fn query_into(&mut self, tx: &[u8], buf: &mut [u8]) -> Result<()> {
        self.send(tx)?;
        self.receive(buf)
    }

    /// Send `tx` and return an `N`-byte reply
    pub fn query<const N: usize>(&mut self, tx: &[u8]) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.query_into(tx, &mut buf)?;
        Ok(buf)
    }

    /// Write raw bytes
    ///
    /// Unread input is discarded first, so a reply longer than the caller
    /// consumed cannot leak into the next exchange.
    pub fn send(&mut self, tx: &[u8]) -> Result<()> {
        self.transport.flush_input()?;
        self.log_bytes("TX", tx);
        self.transport.write(tx)
    }

    /// Read exactly `buf.len()` raw bytes
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.transport.read(buf)?;
        self.log_bytes("RX", buf);
        Ok(())
    }

    /// Write a single byte
    pub fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.send(&[byte])
    }

    /// Read a single byte
    pub fn receive_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8];
        self.receive(&mut buf)?;
        Ok(buf[0])
    }

    /// Pulse the adapter's hardware reset
    pub fn reset_adapter(&mut self) -> Result<()> {
        self.transport.reset_adapter()
    }

    /// Discard buffered input and output
    pub fn flush(&mut self) -> Result<()> {
        self.transport.flush_output()?;
        self.transport.flush_input()
    }

    /// Release the transport
    ///
    /// Subsequent calls are no-ops so the handle is released exactly once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.transport.close()
    }

    fn log_bytes(&self, dir: &str, bytes: &[u8]) {
        if self.trace {
            log::debug!("{}: {}", dir, hex(bytes));
        } else if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}: {}", dir, hex(bytes));
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
