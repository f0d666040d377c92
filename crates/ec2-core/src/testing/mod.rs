//! Test doubles for the transport layer
//!
//! [`MockTransport`] answers each write through a [`Responder`] and queues the
//! reply for the following reads. Every write, reset and close is recorded in
//! a shared [`IoLog`] so tests can assert on the exact wire traffic.

mod adapter;

pub use adapter::{FakeAdapter, FakeTarget, SharedAdapter};

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::transport::{AdapterKind, Connector, PortSpec, Transport};

/// Produces the adapter's reply to one write
pub trait Responder: Send {
    /// Bytes the adapter sends back after `tx`; empty means silence
    fn respond(&mut self, tx: &[u8]) -> Vec<u8>;

    /// Hardware reset line pulsed
    fn reset(&mut self) {}

    /// Transport released
    fn close(&mut self) {}
}

struct FnResponder<F>(F);

impl<F> Responder for FnResponder<F>
where
    F: FnMut(&[u8]) -> Vec<u8> + Send,
{
    fn respond(&mut self, tx: &[u8]) -> Vec<u8> {
        (self.0)(tx)
    }
}

#[derive(Debug, Default)]
struct IoRecord {
    writes: Vec<Vec<u8>>,
    resets: usize,
    closes: usize,
}

/// Shared record of transport activity
#[derive(Debug, Clone, Default)]
pub struct IoLog(Arc<Mutex<IoRecord>>);

impl IoLog {
    /// Every write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().writes.clone()
    }

    /// Number of writes
    pub fn write_count(&self) -> usize {
        self.0.lock().unwrap().writes.len()
    }

    /// Number of adapter resets
    pub fn resets(&self) -> usize {
        self.0.lock().unwrap().resets
    }

    /// Number of transport closes
    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    /// Whether `tx` was written at least once
    pub fn contains(&self, tx: &[u8]) -> bool {
        self.0.lock().unwrap().writes.iter().any(|w| w == tx)
    }
}

/// Scripted transport
pub struct MockTransport {
    adapter: AdapterKind,
    responder: Box<dyn Responder>,
    rx: VecDeque<u8>,
    log: IoLog,
    max_payload: usize,
}

impl MockTransport {
    /// Transport answering through `responder`
    pub fn new(adapter: AdapterKind, responder: Box<dyn Responder>) -> Self {
        Self {
            adapter,
            responder,
            rx: VecDeque::new(),
            log: IoLog::default(),
            max_payload: usize::MAX,
        }
    }

    /// Transport answering through a closure
    pub fn responder<F>(adapter: AdapterKind, f: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        Self::new(adapter, Box::new(FnResponder(f)))
    }

    /// Record into an existing log
    pub fn with_log(mut self, log: IoLog) -> Self {
        self.log = log;
        self
    }

    /// Limit the size of a single write
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Handle to this transport's log
    pub fn log(&self) -> IoLog {
        self.log.clone()
    }
}

impl Transport for MockTransport {
    fn adapter(&self) -> AdapterKind {
        self.adapter
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        assert!(data.len() <= self.max_payload, "write exceeds max payload");
        self.log.0.lock().unwrap().writes.push(data.to_vec());
        let reply = self.responder.respond(data);
        self.rx.extend(reply);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.rx.len() < buf.len() {
            self.rx.clear();
            return Err(Error::Timeout);
        }
        for b in buf.iter_mut() {
            *b = self.rx.pop_front().unwrap();
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn flush_output(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset_adapter(&mut self) -> Result<()> {
        self.log.0.lock().unwrap().resets += 1;
        self.responder.reset();
        Ok(())
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn close(&mut self) -> Result<()> {
        self.log.0.lock().unwrap().closes += 1;
        self.responder.close();
        Ok(())
    }
}

type Factory = Box<dyn Fn(&PortSpec) -> Result<MockTransport>>;

/// Connector handing out mock transports
pub struct MockConnector {
    factory: Factory,
    opens: Cell<usize>,
}

impl MockConnector {
    /// Connector building each transport with `factory`
    pub fn new(factory: impl Fn(&PortSpec) -> Result<MockTransport> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            opens: Cell::new(0),
        }
    }

    /// Connector whose transports all talk to the same emulated adapter
    pub fn emulated(adapter: SharedAdapter, log: IoLog) -> Self {
        Self::new(move |port| {
            let kind = adapter.with(|a| a.kind);
            if port.adapter() != kind {
                return Err(Error::TransportOpen(format!("no adapter at {}", port)));
            }
            let mut transport =
                MockTransport::new(kind, Box::new(adapter.clone())).with_log(log.clone());
            if kind == AdapterKind::Usb {
                transport = transport.with_max_payload(63);
            }
            Ok(transport)
        })
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.opens.get()
    }
}

impl Connector for MockConnector {
    fn open(&self, port: &PortSpec) -> Result<Box<dyn Transport>> {
        let transport = (self.factory)(port)?;
        self.opens.set(self.opens.get() + 1);
        Ok(Box::new(transport))
    }
}
