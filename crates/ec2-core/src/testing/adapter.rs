//! Byte-level emulation of an adapter and the chip behind it
//!
//! Just enough of the boot-loader and both debug command sets to drive a
//! session end to end. Flash programming only clears bits, like real flash.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::Responder;
use crate::device::DebugMode;
use crate::transport::AdapterKind;

const ACK: u8 = 0x0D;
const BLOCK: usize = 512;

fn ack() -> Vec<u8> {
    vec![ACK]
}

fn addr24(lo: u8, mid: u8, hi: u8) -> usize {
    lo as usize | (mid as usize) << 8 | (hi as usize) << 16
}

fn read_mem(mem: &[u8], start: usize, len: u8) -> Vec<u8> {
    mem.get(start..start + len as usize)
        .map(|s| s.to_vec())
        .unwrap_or_default()
}

fn program(mem: &mut [u8], start: usize, data: &[u8]) {
    for (i, &b) in data.iter().enumerate() {
        mem[start + i] &= b;
    }
}

fn erase(mem: &mut [u8], addr: usize, sector: usize) {
    let base = addr / sector * sector;
    mem[base..base + sector].fill(0xFF);
}

/// Emulated 8051 target
#[derive(Debug, Clone)]
pub struct FakeTarget {
    /// Debug interface the chip answers on
    pub mode: DebugMode,
    /// Identification value
    pub id: u16,
    /// Unique-id byte
    pub unique_id: u8,
    /// Code flash contents
    pub flash: Vec<u8>,
    /// Code flash sector size
    pub sector_size: usize,
    /// Scratch-pad contents
    pub scratch: Vec<u8>,
    /// Scratch-pad sector size
    pub scratch_sector: usize,
    /// Internal RAM
    pub ram: [u8; 256],
    /// SFR space; 0x20/0x21 hold the program counter
    pub sfr: [u8; 256],
    /// External data space
    pub xdata: Vec<u8>,
    /// Core stopped
    pub halted: bool,
    /// Polls answered "running" after `go` before the core stops
    pub polls_until_halt: u32,
    /// Breakpoint comparator addresses
    pub bp_addrs: [u32; 4],
    /// Breakpoint enable mask last written
    pub bp_mask: u8,
    /// Number of sector erases issued
    pub sector_erases: usize,
    xdata_page: u8,
    polls_left: u32,
}

impl FakeTarget {
    /// Blank chip
    pub fn new(mode: DebugMode, id: u16, flash_size: usize, sector_size: usize) -> Self {
        Self {
            mode,
            id,
            unique_id: 0,
            flash: vec![0xFF; flash_size],
            sector_size,
            scratch: vec![0xFF; 256],
            scratch_sector: 128,
            ram: [0; 256],
            sfr: [0; 256],
            xdata: vec![0; 0x10000],
            halted: true,
            polls_until_halt: 3,
            bp_addrs: [0; 4],
            bp_mask: 0,
            sector_erases: 0,
            xdata_page: 0,
            polls_left: 0,
        }
    }

    /// Current program counter
    pub fn pc(&self) -> u16 {
        u16::from_le_bytes([self.sfr[0x20], self.sfr[0x21]])
    }

    fn set_pc(&mut self, pc: u16) {
        let [lo, hi] = pc.to_le_bytes();
        self.sfr[0x20] = lo;
        self.sfr[0x21] = hi;
    }

    fn go(&mut self) -> Vec<u8> {
        self.halted = false;
        self.polls_left = self.polls_until_halt;
        ack()
    }

    fn poll(&mut self) -> Vec<u8> {
        if !self.halted {
            if self.polls_left == 0 {
                self.halted = true;
                let hit = (0..4)
                    .filter(|&i| self.bp_mask & (1 << i) != 0)
                    .map(|i| self.bp_addrs[i])
                    .min();
                if let Some(addr) = hit {
                    self.set_pc(addr as u16);
                }
            } else {
                self.polls_left -= 1;
            }
        }
        vec![self.halted as u8]
    }

    fn step(&mut self) -> Vec<u8> {
        self.set_pc(self.pc().wrapping_add(1));
        ack()
    }

    fn reset(&mut self) -> Vec<u8> {
        self.set_pc(0);
        self.halted = true;
        ack()
    }

    fn flash_mem(&mut self, scratch: bool) -> (&mut Vec<u8>, usize) {
        if scratch {
            (&mut self.scratch, self.scratch_sector)
        } else {
            (&mut self.flash, self.sector_size)
        }
    }

    fn erase_sector(&mut self, addr: usize, scratch: bool) -> Vec<u8> {
        self.sector_erases += 1;
        let (mem, sector) = self.flash_mem(scratch);
        erase(mem, addr, sector);
        ack()
    }

    fn xdata_addr(&self, offset: u8) -> usize {
        (self.xdata_page as usize) << 8 | offset as usize
    }

    fn c2(&mut self, tx: &[u8]) -> Vec<u8> {
        match *tx {
            [0x20] | [0x21] => ack(),
            [0x22] => self.id.to_be_bytes().to_vec(),
            [0x23] => vec![self.unique_id],
            [0x24] => self.go(),
            [0x25] => {
                self.halted = true;
                ack()
            }
            [0x26] => self.step(),
            [0x27] => self.poll(),
            [0x28, addr, len] => read_mem(&self.sfr, addr as usize, len),
            [0x29, addr, 0x01, value] => {
                self.sfr[addr as usize] = value;
                ack()
            }
            [0x2A, addr, len] => read_mem(&self.ram, addr as usize, len),
            [0x2B, addr, _, ref data @ ..] => {
                let start = addr as usize;
                self.ram[start..start + data.len()].copy_from_slice(data);
                ack()
            }
            [0x2C] => self.reset(),
            [0x2D, page] => {
                self.xdata_page = page;
                ack()
            }
            [0x2E, lo, mid, hi, len] => read_mem(&self.flash, addr24(lo, mid, hi), len),
            [0x2F, lo, mid, hi, _, ref data @ ..] => {
                program(&mut self.flash, addr24(lo, mid, hi), data);
                ack()
            }
            [0x30, lo, mid, hi] => self.erase_sector(addr24(lo, mid, hi), false),
            [0x31, slot, lo, hi] => {
                self.bp_addrs[slot as usize] = u16::from_le_bytes([lo, hi]) as u32;
                ack()
            }
            [0x32, mask] => {
                self.bp_mask = mask;
                ack()
            }
            [0x3C] => {
                self.flash.fill(0xFF);
                ack()
            }
            [0x3D, _] => ack(),
            [0x3E, offset, len] => read_mem(&self.xdata, self.xdata_addr(offset), len),
            [0x3F, offset, _, ref data @ ..] => {
                let start = self.xdata_addr(offset);
                self.xdata[start..start + data.len()].copy_from_slice(data);
                ack()
            }
            _ => Vec::new(),
        }
    }

    fn jtag(&mut self, tx: &[u8]) -> Vec<u8> {
        match *tx {
            [0x04] | [0x1B, 0x00] => ack(),
            [0x0B, 0x00] => {
                self.halted = true;
                ack()
            }
            [0x0A, 0x00] => self.id.to_be_bytes().to_vec(),
            [0x10, 0x00] => vec![self.unique_id],
            [0x02, 0x02, addr, len] => read_mem(&self.sfr, addr as usize, len),
            [0x03, 0x02, addr, value] => {
                self.sfr[addr as usize] = value;
                ack()
            }
            [0x06, 0x02, addr, len] => read_mem(&self.ram, addr as usize, len),
            [0x07, 0x02, addr, value] => {
                self.ram[addr as usize] = value;
                ack()
            }
            [0x08, 0x00] => self.go(),
            [0x09, 0x00] => self.step(),
            [0x11, 0x00] => self.reset(),
            [0x13, 0x00] => self.poll(),
            [0x12, 0x00] | [0x12, 0x01] => ack(),
            [0x12, 0x02, page] => {
                self.xdata_page = page;
                ack()
            }
            [0x12, 0x03, offset, len] => read_mem(&self.xdata, self.xdata_addr(offset), len),
            [0x12, 0x04, offset, _, ref data @ ..] => {
                let start = self.xdata_addr(offset);
                self.xdata[start..start + data.len()].copy_from_slice(data);
                ack()
            }
            [0x14, flag, lo, mid, hi, len] => {
                let (mem, _) = self.flash_mem(flag == 0x01);
                read_mem(mem, addr24(lo, mid, hi), len)
            }
            [0x15, flag, lo, mid, hi, _, ref data @ ..] => {
                let (mem, _) = self.flash_mem(flag == 0x01);
                program(mem, addr24(lo, mid, hi), data);
                ack()
            }
            [0x16, flag, lo, mid, hi] => self.erase_sector(addr24(lo, mid, hi), flag == 0x01),
            [0x17, 0x00] => {
                self.flash.fill(0xFF);
                ack()
            }
            [0x19, slot, lo, mid, hi] => {
                self.bp_addrs[slot as usize] = addr24(lo, mid, hi) as u32;
                ack()
            }
            [0x1A, mask] => {
                self.bp_mask = mask;
                ack()
            }
            _ => Vec::new(),
        }
    }
}

/// Emulated adapter
#[derive(Debug, Clone)]
pub struct FakeAdapter {
    /// Adapter generation
    pub kind: AdapterKind,
    /// Boot-loader version byte
    pub boot_version: u8,
    /// Application firmware version reported by run-app
    pub firmware_version: u8,
    /// Chip on the debug port, if any
    pub target: Option<FakeTarget>,
    /// Firmware blocks written through the boot-loader
    pub blocks: BTreeMap<u8, Vec<u8>>,
    /// Report a wrong checksum for every block
    pub corrupt_checksums: bool,
    /// Boot-loader pages selected, in order
    pub selected_pages: Vec<u8>,
    in_boot: bool,
    boot_page: u8,
    pending: Option<Vec<u8>>,
}

impl FakeAdapter {
    /// Adapter with the given firmware and chip
    pub fn new(kind: AdapterKind, firmware_version: u8, target: Option<FakeTarget>) -> Self {
        Self {
            kind,
            boot_version: 0x01,
            firmware_version,
            target,
            blocks: BTreeMap::new(),
            corrupt_checksums: false,
            selected_pages: Vec::new(),
            in_boot: true,
            boot_page: 0,
            pending: None,
        }
    }

    /// Wrap for sharing between transports
    pub fn shared(self) -> SharedAdapter {
        SharedAdapter(Arc::new(Mutex::new(self)))
    }

    fn boot(&mut self, tx: &[u8]) -> Vec<u8> {
        match *tx {
            [0x55] if self.kind == AdapterKind::Serial => vec![0x5A],
            [0x00, 0x00, 0x00] => vec![self.boot_version],
            [0x01, page, 0x00] => {
                self.boot_page = page;
                self.selected_pages.push(page);
                vec![0x00]
            }
            [0x02, 0x00, 0x00] => {
                self.blocks.insert(self.boot_page, vec![0xFF; BLOCK]);
                vec![0x00]
            }
            [0x03, 0x02, 0x00] => {
                self.pending = Some(Vec::with_capacity(BLOCK));
                Vec::new()
            }
            [0x04, 0x00, 0x00] => {
                let sum = self
                    .blocks
                    .get(&self.boot_page)
                    .map(|b| b.iter().fold(0u16, |acc, &x| acc.wrapping_add(x as u16)))
                    .unwrap_or(0);
                let sum = if self.corrupt_checksums {
                    sum.wrapping_add(1)
                } else {
                    sum
                };
                sum.to_le_bytes().to_vec()
            }
            [0x05, 0x17, 0xFF] if self.kind == AdapterKind::Usb => vec![0xFF],
            [0x06, 0x00, 0x00] => {
                self.in_boot = false;
                vec![self.firmware_version]
            }
            _ => Vec::new(),
        }
    }

    fn app(&mut self, tx: &[u8]) -> Vec<u8> {
        let Some(&op) = tx.first() else {
            return Vec::new();
        };
        if op == 0x0C {
            // comparator registers read back as zero
            return vec![0x00; 3];
        }
        let (mode, is_id) = match op {
            0x02..=0x1B => (DebugMode::Jtag, tx == [0x0A, 0x00]),
            0x20..=0x3F => (DebugMode::C2, tx == [0x22]),
            _ => return Vec::new(),
        };
        match self.target.as_mut() {
            None if is_id => vec![0xFF, 0x00],
            Some(t) if t.mode != mode && is_id => vec![0xFF, 0xFF],
            Some(t) if t.mode == mode => match mode {
                DebugMode::Jtag => t.jtag(tx),
                DebugMode::C2 => t.c2(tx),
            },
            _ => ack(),
        }
    }
}

impl Responder for FakeAdapter {
    fn respond(&mut self, tx: &[u8]) -> Vec<u8> {
        if let Some(block) = self.pending.as_mut() {
            block.extend_from_slice(tx);
            if block.len() < BLOCK {
                return Vec::new();
            }
            let data = self.pending.take().unwrap_or_default();
            self.blocks.insert(self.boot_page, data);
            return vec![0x00];
        }
        if self.in_boot {
            self.boot(tx)
        } else {
            self.app(tx)
        }
    }

    fn reset(&mut self) {
        self.in_boot = true;
        self.pending = None;
    }

    fn close(&mut self) {
        self.in_boot = true;
        self.pending = None;
    }
}

/// Emulated adapter shared by every transport a connector opens
#[derive(Debug, Clone)]
pub struct SharedAdapter(Arc<Mutex<FakeAdapter>>);

impl SharedAdapter {
    /// Run `f` with the adapter locked
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeAdapter) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    /// Run `f` on the emulated chip
    pub fn target<R>(&self, f: impl FnOnce(&mut FakeTarget) -> R) -> R {
        self.with(|a| f(a.target.as_mut().unwrap()))
    }
}

impl Responder for SharedAdapter {
    fn respond(&mut self, tx: &[u8]) -> Vec<u8> {
        self.0.lock().unwrap().respond(tx)
    }

    fn reset(&mut self) {
        self.0.lock().unwrap().reset()
    }

    fn close(&mut self) {
        self.0.lock().unwrap().close()
    }
}
