//! Hardware breakpoint table
//!
//! The debug logic has four address comparators and one enable mask. The
//! table mirrors them locally; the local copy only changes after the adapter
//! accepted the new state, so it always equals what the hardware holds.

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Number of hardware breakpoint slots
pub const SLOTS: usize = 4;

bitflags! {
    /// Enable bits of the breakpoint slots
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SlotMask: u8 {
        /// Slot 0
        const SLOT0 = 1 << 0;
        /// Slot 1
        const SLOT1 = 1 << 1;
        /// Slot 2
        const SLOT2 = 1 << 2;
        /// Slot 3
        const SLOT3 = 1 << 3;
    }
}

impl SlotMask {
    /// Mask with only `slot` set
    pub fn slot(slot: usize) -> Self {
        Self::from_bits_truncate(1 << slot)
    }
}

/// One active breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    /// Comparator slot
    pub slot: usize,
    /// Code address
    pub address: u32,
}

/// Where breakpoint state is committed
pub trait BreakpointHardware {
    /// Program a comparator address
    fn set_address(&mut self, slot: u8, addr: u32) -> Result<()>;

    /// Write the enable mask of all slots
    fn write_mask(&mut self, mask: u8) -> Result<()>;
}

/// Local mirror of the breakpoint comparators
#[derive(Debug, Clone, Default)]
pub struct Breakpoints {
    addrs: [u32; SLOTS],
    active: SlotMask,
}

impl Breakpoints {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Current enable mask
    pub fn mask(&self) -> SlotMask {
        self.active
    }

    /// Slot holding an active breakpoint at `addr`
    pub fn slot_of(&self, addr: u32) -> Option<usize> {
        (0..SLOTS).find(|&i| self.active.contains(SlotMask::slot(i)) && self.addrs[i] == addr)
    }

    /// Whether a breakpoint is set at `addr`
    pub fn is_set(&self, addr: u32) -> bool {
        self.slot_of(addr).is_some()
    }

    /// Whether slot `slot` is in use
    pub fn is_active(&self, slot: usize) -> bool {
        slot < SLOTS && self.active.contains(SlotMask::slot(slot))
    }

    /// Lowest unused slot
    pub fn next_free(&self) -> Option<usize> {
        (0..SLOTS).find(|&i| !self.active.contains(SlotMask::slot(i)))
    }

    /// Active breakpoints in slot order
    pub fn iter(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        (0..SLOTS)
            .filter(|&i| self.active.contains(SlotMask::slot(i)))
            .map(|slot| Breakpoint {
                slot,
                address: self.addrs[slot],
            })
    }

    /// Log the table at debug level
    pub fn dump(&self) {
        for slot in 0..SLOTS {
            log::debug!(
                "breakpoint {}: 0x{:05X} {}",
                slot,
                self.addrs[slot],
                if self.active.contains(SlotMask::slot(slot)) {
                    "active"
                } else {
                    "inactive"
                }
            );
        }
    }

    /// Set a breakpoint at `addr` and return its slot
    pub fn add<H: BreakpointHardware + ?Sized>(&mut self, hw: &mut H, addr: u32) -> Result<usize> {
        if self.is_set(addr) {
            return Err(Error::DuplicateBreakpoint(addr));
        }
        let slot = self.next_free().ok_or(Error::BreakpointTableFull)?;
        let mask = self.active | SlotMask::slot(slot);
        hw.set_address(slot as u8, addr)?;
        hw.write_mask(mask.bits())?;
        self.addrs[slot] = addr;
        self.active = mask;
        log::debug!("breakpoint {} set at 0x{:05X}", slot, addr);
        Ok(slot)
    }

    /// Remove the breakpoint at `addr`
    pub fn remove<H: BreakpointHardware + ?Sized>(&mut self, hw: &mut H, addr: u32) -> Result<()> {
        let slot = self.slot_of(addr).ok_or(Error::BreakpointNotFound(addr))?;
        let mask = self.active - SlotMask::slot(slot);
        hw.write_mask(mask.bits())?;
        self.active = mask;
        log::debug!("breakpoint {} at 0x{:05X} removed", slot, addr);
        Ok(())
    }

    /// Disable every slot
    pub fn clear_all<H: BreakpointHardware + ?Sized>(&mut self, hw: &mut H) -> Result<()> {
        hw.write_mask(0)?;
        self.active = SlotMask::empty();
        Ok(())
    }
}
