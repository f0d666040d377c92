//! Adapter session and connection state machine
//!
//! A [`Session`] owns the link to one adapter, the driver of the debug mode
//! the target answered on, the identified device and the breakpoint table.
//! Every target operation goes through it; address checks happen here
//! before any command reaches the wire.
//!
//! # Connecting
//!
//! ```text
//! Disconnected -> TransportOpen -> ModeSelected -> Connected
//!                                       |
//!                                  AutoProbing -> Disconnected -> (retry in JTAG)
//! ```
//!
//! In automatic mode the simpler C2 protocol is tried first. An
//! identification value of `0xFFFF` means the chip does not speak it, and
//! the whole connection is torn down and rebuilt in JTAG mode once.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::boot;
use crate::breakpoint::{BreakpointHardware, Breakpoints};
use crate::device::{DebugMode, DeviceDb, DeviceDescriptor};
use crate::error::{AddressSpace, Error, Result};
use crate::firmware;
use crate::flash::{self, FlashAccess, Region};
use crate::link::{Link, Script, Step};
use crate::mode::{driver_for, TargetDriver};
use crate::progress::{Progress, ProgressFn};
use crate::transport::{AdapterKind, Connector, PortSpec};

/// SFR page select register
const SFRPAGE: u8 = 0x84;

/// Program status word
const PSW: u8 = 0xD0;

/// Pseudo-SFR holding R0 and R1 while the core is halted
const R0_R1_SFR: u8 = 0x24;

/// Registers whose datasheet address reads the wrong value over the debug
/// port, and the pseudo-SFR to use instead
const SFR_FIXUPS: &[(u8, u8)] = &[(PSW, 0x23), (0xE0, 0x22)];

/// Interval between halt polls while waiting for a breakpoint
const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Identification values meaning no chip answered
const ID_NO_TARGET: u16 = 0xFF00;
const ID_WRONG_MODE: u16 = 0xFFFF;

/// Breakpoint comparator priming issued by the USB adapter before a run
static RUN_PREAMBLE: Script = Script::new(
    "run preamble",
    &[
        Step::new(&[0x0C, 0x02, 0xA0, 0x10], &[0x00, 0x01, 0x00]),
        Step::new(&[0x0C, 0x02, 0xA1, 0x10], &[0x00, 0x00, 0x00]),
        Step::new(&[0x0C, 0x02, 0xB0, 0x09], &[0x00, 0x00, 0x01]),
        Step::new(&[0x0C, 0x02, 0xB1, 0x09], &[0x00, 0x00, 0x01]),
        Step::new(&[0x0C, 0x02, 0xB2, 0x0B], &[0x20, 0x00, 0x00]),
    ],
);

/// Requested debug mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Probe C2, fall back to JTAG
    #[default]
    Auto,
    /// JTAG only
    Jtag,
    /// C2 only
    C2,
    /// Talk to the adapter's boot-loader; no target access
    Bootloader,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Jtag => write!(f, "JTAG"),
            Mode::C2 => write!(f, "C2"),
            Mode::Bootloader => write!(f, "boot-loader"),
        }
    }
}

/// Where a session is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport
    Disconnected,
    /// Transport open, target not attached
    TransportOpen,
    /// Debug mode selected on the adapter, target not yet identified
    ModeSelected,
    /// Target identified and reset
    Connected,
    /// Automatic probe found the wrong mode; about to reconnect
    AutoProbing,
}

/// A register that may live on a non-default SFR page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedRegister {
    /// SFR page
    pub page: u8,
    /// Register address (0x80-0xFF)
    pub addr: u8,
}

#[derive(Debug, Clone, Copy)]
enum Attach {
    Probe,
    Explicit(DebugMode),
}

/// Borrowed view of a connected target used by the flash engine and the
/// breakpoint table
struct Target<'s> {
    link: &'s mut Link,
    driver: &'s mut dyn TargetDriver,
    device: &'s DeviceDescriptor,
    progress: &'s mut Progress,
}

impl FlashAccess for Target<'_> {
    fn descriptor(&self) -> &DeviceDescriptor {
        self.device
    }

    fn supports_scratchpad(&self) -> bool {
        self.driver.supports_scratchpad()
    }

    fn read(&mut self, region: Region, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.driver
            .read_flash(self.link, addr, buf, region == Region::Scratchpad)
    }

    fn program(&mut self, region: Region, addr: u32, data: &[u8]) -> Result<()> {
        self.driver
            .write_flash(self.link, addr, data, region == Region::Scratchpad)
    }

    fn erase_sector(&mut self, region: Region, addr: u32) -> Result<()> {
        self.driver
            .erase_sector(self.link, addr, region == Region::Scratchpad)
    }

    fn erase_all(&mut self) -> Result<()> {
        self.driver.erase_all(self.link)
    }

    fn progress(&mut self, percent: u8) {
        self.progress.report(percent);
    }
}

impl BreakpointHardware for Target<'_> {
    fn set_address(&mut self, slot: u8, addr: u32) -> Result<()> {
        self.driver.set_breakpoint_address(self.link, slot, addr)
    }

    fn write_mask(&mut self, mask: u8) -> Result<()> {
        self.driver.write_breakpoint_mask(self.link, mask)
    }
}

fn check_range(space: AddressSpace, start: u32, len: usize, end: u32) -> Result<()> {
    if start as u64 + len as u64 > end as u64 {
        return Err(Error::RangeViolation { space, start, len });
    }
    Ok(())
}

fn check_sfr(addr: u8) -> Result<()> {
    if addr < 0x80 {
        return Err(Error::RangeViolation {
            space: AddressSpace::Sfr,
            start: addr as u32,
            len: 1,
        });
    }
    Ok(())
}

fn sfr_fixup(addr: u8) -> u8 {
    SFR_FIXUPS
        .iter()
        .find(|(from, _)| *from == addr)
        .map_or(addr, |&(_, to)| to)
}

/// One adapter connection
pub struct Session {
    requested: Mode,
    state: ConnectionState,
    port: Option<PortSpec>,
    link: Option<Link>,
    driver: Option<Box<dyn TargetDriver>>,
    device: Option<DeviceDescriptor>,
    firmware_version: Option<u8>,
    breakpoints: Breakpoints,
    progress: Progress,
    trace: bool,
}

impl Session {
    /// Create a disconnected session that will connect in `mode`
    pub fn new(mode: Mode) -> Self {
        Self {
            requested: mode,
            state: ConnectionState::Disconnected,
            port: None,
            link: None,
            driver: None,
            device: None,
            firmware_version: None,
            breakpoints: Breakpoints::new(),
            progress: Progress::new(),
            trace: false,
        }
    }

    /// Log wire traffic at debug level
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
        if let Some(link) = self.link.as_mut() {
            link.set_trace(trace);
        }
    }

    /// Install a progress callback for long flash operations
    pub fn set_progress_callback(&mut self, callback: ProgressFn) {
        self.progress.set_callback(callback);
    }

    /// Last reported progress percentage
    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a target is attached
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Mode requested at creation
    pub fn requested_mode(&self) -> Mode {
        self.requested
    }

    /// Debug mode the target answered on
    pub fn mode(&self) -> Option<DebugMode> {
        self.driver.as_ref().map(|d| d.mode())
    }

    /// Port of the current or last connection
    pub fn port(&self) -> Option<&PortSpec> {
        self.port.as_ref()
    }

    /// Kind of the connected adapter
    pub fn adapter(&self) -> Option<AdapterKind> {
        self.port.as_ref().map(PortSpec::adapter)
    }

    /// Application firmware version reported by the adapter
    pub fn firmware_version(&self) -> Option<u8> {
        self.firmware_version
    }

    /// Identified device
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Breakpoint table
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Open the adapter at `port` and attach to the target behind it
    ///
    /// On any failure the session is left disconnected.
    pub fn connect(&mut self, port: &str, connector: &dyn Connector, db: &DeviceDb) -> Result<()> {
        let spec = PortSpec::parse(port)?;
        if self.state != ConnectionState::Disconnected {
            self.disconnect();
        }
        self.port = Some(spec.clone());
        let result = self.establish(&spec, connector, db);
        if let Err(e) = &result {
            log::debug!("connect failed: {}", e);
            self.disconnect();
        }
        result
    }

    fn establish(&mut self, spec: &PortSpec, connector: &dyn Connector, db: &DeviceDb) -> Result<()> {
        let mut plan = match self.requested {
            Mode::Bootloader => {
                self.open(spec, connector)?;
                log::info!("{} boot-loader mode, target not attached", spec.adapter());
                return Ok(());
            }
            Mode::Auto => {
                log::warn!("automatic mode detection may not work on all devices, set the mode explicitly if it fails");
                Attach::Probe
            }
            Mode::Jtag => Attach::Explicit(DebugMode::Jtag),
            Mode::C2 => Attach::Explicit(DebugMode::C2),
        };
        loop {
            self.open(spec, connector)?;
            self.enter_application()?;
            match self.attach(plan, db)? {
                None => return Ok(()),
                Some(mode) => {
                    // switching modes on a live adapter is unreliable
                    self.disconnect();
                    plan = Attach::Explicit(mode);
                }
            }
        }
    }

    fn open(&mut self, spec: &PortSpec, connector: &dyn Connector) -> Result<()> {
        let mut link = Link::new(connector.open(spec)?);
        link.set_trace(self.trace);
        link.flush()?;
        log::info!("opened {} adapter on {}", spec.adapter(), spec);
        self.link = Some(link);
        self.state = ConnectionState::TransportOpen;
        Ok(())
    }

    fn enter_application(&mut self) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let adapter = link.adapter();
        link.reset_adapter()?;
        if adapter == AdapterKind::Serial {
            boot::sync(link)?;
        }
        let boot_version = boot::get_version(link)?;
        log::debug!("{} boot-loader version 0x{:02x}", adapter, boot_version);
        let page = match adapter {
            AdapterKind::Serial => boot::SERIAL_APP_PAGE,
            AdapterKind::Usb => boot::USB_APP_PAGE,
        };
        boot::select_page(link, page)?;
        let version = boot::run_app(link)?;
        self.firmware_version = Some(version);
        log::info!("{} firmware version 0x{:02x}", adapter, version);

        let (min, max) = adapter.firmware_window();
        if version < min {
            log::error!(
                "{} firmware 0x{:02x} is too old, update to 0x{:02x}",
                adapter,
                version,
                max
            );
            return Err(Error::VersionIncompatible {
                adapter: adapter.name(),
                version,
                min,
                max,
            });
        }
        if version > max {
            log::warn!(
                "{} firmware 0x{:02x} is newer than the tested 0x{:02x}",
                adapter,
                version,
                max
            );
        }
        Ok(())
    }

    /// Attach in the planned mode; returns the mode to retry in, if any
    fn attach(&mut self, plan: Attach, db: &DeviceDb) -> Result<Option<DebugMode>> {
        let mode = match plan {
            Attach::Probe => DebugMode::C2,
            Attach::Explicit(mode) => mode,
        };
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let driver = self.driver.insert(driver_for(mode));
        driver.connect_target(link)?;
        self.state = ConnectionState::ModeSelected;

        let id = driver.device_id(link)?;
        match (plan, id) {
            (Attach::Probe, ID_WRONG_MODE) => {
                log::info!("no reply in C2 mode, retrying in JTAG mode");
                self.state = ConnectionState::AutoProbing;
                return Ok(Some(DebugMode::Jtag));
            }
            (_, ID_NO_TARGET | ID_WRONG_MODE) => {
                log::error!("debug adapter not connected to a microcontroller");
                return Err(Error::TargetAbsent(id));
            }
            _ => {}
        }

        let [family, revision] = id.to_be_bytes();
        let unique_id = driver.unique_device_id(link)?;
        log::debug!(
            "device id 0x{:04x}, unique id 0x{:02x}",
            id,
            unique_id
        );
        let device = db
            .find_by_unique_id(family, unique_id)
            .or_else(|| db.find_by_id(family, revision))
            .cloned()
            .ok_or(Error::UnknownDevice { family, revision })?;
        if !device.tested {
            log::warn!("{} support has not been verified on hardware", device.name);
        }

        driver.reset(link)?;
        log::info!("connected to {} in {} mode", device, mode);
        self.device = Some(device);
        self.breakpoints = Breakpoints::new();
        self.state = ConnectionState::Connected;
        Ok(None)
    }

    /// Detach from the target and release the adapter
    ///
    /// Safe to call in any state; the transport is closed exactly once.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            // the serial adapter lets go of the target when DTR drops
            if link.adapter() == AdapterKind::Usb {
                if let Some(driver) = self.driver.as_mut() {
                    if let Err(e) = driver.disconnect_target(&mut link) {
                        log::debug!("target disconnect failed: {}", e);
                    }
                }
            }
            if let Err(e) = link.close() {
                log::warn!("failed to release adapter: {}", e);
            }
            log::debug!("adapter released");
        }
        self.driver = None;
        self.device = None;
        self.state = ConnectionState::Disconnected;
    }

    fn connected(&mut self) -> Result<(&mut Link, &mut dyn TargetDriver)> {
        match (self.link.as_mut(), self.driver.as_mut()) {
            (Some(link), Some(driver)) if self.state == ConnectionState::Connected => {
                Ok((link, driver.as_mut()))
            }
            _ => Err(Error::NotConnected),
        }
    }

    fn target(&mut self) -> Result<(Target<'_>, &mut Breakpoints)> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        match (self.link.as_mut(), self.driver.as_mut(), self.device.as_ref()) {
            (Some(link), Some(driver), Some(device)) => Ok((
                Target {
                    link,
                    driver: driver.as_mut(),
                    device,
                    progress: &mut self.progress,
                },
                &mut self.breakpoints,
            )),
            _ => Err(Error::NotConnected),
        }
    }

    // ------------------------------------------------------------------
    // Data memory
    // ------------------------------------------------------------------

    /// Read internal RAM
    pub fn read_ram(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        check_range(AddressSpace::Ram, addr as u32, buf.len(), 0x100)?;
        let (link, driver) = self.connected()?;
        driver.read_ram_sfr(link, addr, buf, false)
    }

    /// Write internal RAM
    pub fn write_ram(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        check_range(AddressSpace::Ram, addr as u32, data.len(), 0x100)?;
        let (link, driver) = self.connected()?;
        driver.write_ram(link, addr, data)
    }

    /// Read one SFR
    pub fn read_sfr(&mut self, addr: u8) -> Result<u8> {
        check_sfr(addr)?;
        let (link, driver) = self.connected()?;
        let mut value = [0u8];
        driver.read_ram_sfr(link, sfr_fixup(addr), &mut value, true)?;
        Ok(value[0])
    }

    /// Write one SFR
    pub fn write_sfr(&mut self, addr: u8, value: u8) -> Result<()> {
        check_sfr(addr)?;
        let (link, driver) = self.connected()?;
        driver.write_sfr(link, sfr_fixup(addr), value)
    }

    /// Read consecutive SFRs
    pub fn read_sfrs(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        check_sfr(addr)?;
        check_range(AddressSpace::Sfr, addr as u32, buf.len(), 0x100)?;
        for (i, value) in buf.iter_mut().enumerate() {
            *value = self.read_sfr(addr + i as u8)?;
        }
        Ok(())
    }

    fn paged_sfr(&self) -> Result<bool> {
        self.device
            .as_ref()
            .map(|d| d.paged_sfr)
            .ok_or(Error::NotConnected)
    }

    /// Read a register on an SFR page
    ///
    /// The page register is restored afterwards. On devices without SFR
    /// paging the page is ignored.
    pub fn read_paged_sfr(&mut self, reg: PagedRegister) -> Result<u8> {
        check_sfr(reg.addr)?;
        if !self.paged_sfr()? {
            return self.read_sfr(reg.addr);
        }
        let saved = self.read_sfr(SFRPAGE)?;
        self.write_sfr(SFRPAGE, reg.page)?;
        let value = self.read_sfr(reg.addr);
        self.write_sfr(SFRPAGE, saved)?;
        value
    }

    /// Write a register on an SFR page
    pub fn write_paged_sfr(&mut self, reg: PagedRegister, value: u8) -> Result<()> {
        check_sfr(reg.addr)?;
        if !self.paged_sfr()? {
            return self.write_sfr(reg.addr, value);
        }
        let saved = self.read_sfr(SFRPAGE)?;
        self.write_sfr(SFRPAGE, reg.page)?;
        let result = self.write_sfr(reg.addr, value);
        self.write_sfr(SFRPAGE, saved)?;
        result
    }

    /// Read external data space
    pub fn read_xdata(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        check_range(AddressSpace::Xdata, addr as u32, buf.len(), 0x10000)?;
        let (link, driver) = self.connected()?;
        driver.read_xdata(link, addr, buf)
    }

    /// Write external data space
    pub fn write_xdata(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        check_range(AddressSpace::Xdata, addr as u32, data.len(), 0x10000)?;
        let (link, driver) = self.connected()?;
        driver.write_xdata(link, addr, data)
    }

    /// R0-R7 of the register bank selected in PSW
    pub fn read_active_regs(&mut self) -> Result<[u8; 8]> {
        let psw = self.read_sfr(PSW)?;
        let bank = (psw & 0x18) >> 3;
        let mut regs = [0u8; 8];
        self.read_ram(bank * 8, &mut regs)?;
        // R0 and R1 are held by the debug logic while halted
        let (link, driver) = self.connected()?;
        driver.read_ram_sfr(link, R0_R1_SFR, &mut regs[..2], true)?;
        Ok(regs)
    }

    // ------------------------------------------------------------------
    // Flash
    // ------------------------------------------------------------------

    /// Read code flash
    pub fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::read_flash(&mut t, addr, buf)
    }

    /// Program already-erased code flash
    pub fn write_flash(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::write_flash(&mut t, addr, data)
    }

    /// Erase the spanned sectors, then program
    pub fn write_flash_auto_erase(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::write_flash_auto_erase(&mut t, addr, data)
    }

    /// Program while preserving the rest of the spanned sectors
    pub fn write_flash_auto_keep(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::write_flash_auto_keep(&mut t, addr, data)
    }

    /// Erase the sector containing `addr`
    pub fn erase_flash_sector(&mut self, addr: u32) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::erase_sector(&mut t, addr)
    }

    /// Erase all code flash
    pub fn erase_flash(&mut self) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::erase_all(&mut t)
    }

    /// Read the scratch-pad
    pub fn read_scratchpad(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::read_scratchpad(&mut t, offset, buf)
    }

    /// Program already-erased scratch-pad bytes
    pub fn write_scratchpad(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::write_scratchpad(&mut t, offset, data)
    }

    /// Program scratch-pad bytes, preserving the rest
    pub fn write_scratchpad_merge(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::write_scratchpad_merge(&mut t, offset, data)
    }

    /// Erase the whole scratch-pad
    pub fn erase_scratchpad(&mut self) -> Result<()> {
        let (mut t, _) = self.target()?;
        flash::erase_scratchpad(&mut t)
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    /// Set a hardware breakpoint and return its slot
    pub fn add_breakpoint(&mut self, addr: u32) -> Result<usize> {
        let (mut t, bps) = self.target()?;
        bps.add(&mut t, addr)
    }

    /// Remove the hardware breakpoint at `addr`
    pub fn remove_breakpoint(&mut self, addr: u32) -> Result<()> {
        let (mut t, bps) = self.target()?;
        bps.remove(&mut t, addr)
    }

    /// Remove every hardware breakpoint
    pub fn clear_breakpoints(&mut self) -> Result<()> {
        let (mut t, bps) = self.target()?;
        bps.clear_all(&mut t)
    }

    /// Whether a breakpoint is set at `addr`
    pub fn is_breakpoint(&self, addr: u32) -> bool {
        self.breakpoints.is_set(addr)
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    /// Stop the core
    pub fn halt(&mut self) -> Result<()> {
        let (link, driver) = self.connected()?;
        driver.halt(link)
    }

    /// Start the core
    pub fn go(&mut self) -> Result<()> {
        let (link, driver) = self.connected()?;
        driver.go(link)
    }

    /// Execute one instruction and return the new program counter
    pub fn step(&mut self) -> Result<u16> {
        let (link, driver) = self.connected()?;
        driver.step(link)
    }

    /// Reset the target core
    pub fn reset_target(&mut self) -> Result<()> {
        let (link, driver) = self.connected()?;
        driver.reset(link)
    }

    /// Query once whether the core has halted
    pub fn halt_poll(&mut self) -> Result<bool> {
        let (link, driver) = self.connected()?;
        driver.halt_poll(link)
    }

    /// Read the program counter
    pub fn read_pc(&mut self) -> Result<u16> {
        let (link, driver) = self.connected()?;
        driver.read_pc(link)
    }

    /// Set the program counter
    pub fn set_pc(&mut self, pc: u16) -> Result<()> {
        let (link, driver) = self.connected()?;
        driver.set_pc(link, pc)
    }

    /// Run until the core halts or `running` is cleared, then return the PC
    ///
    /// `running` is checked once per poll, so another thread can stop the
    /// wait without tearing the session down. The core keeps running in
    /// that case.
    pub fn run_to_breakpoint(&mut self, running: &AtomicBool) -> Result<u16> {
        self.breakpoints.dump();
        let (link, driver) = self.connected()?;
        driver.go(link)?;
        if link.adapter() == AdapterKind::Usb {
            let failures = RUN_PREAMBLE.run_all(link);
            log::debug!("run preamble: {} replies differ", failures.len());
        }
        loop {
            if driver.halt_poll(link)? {
                log::debug!("target halted");
                break;
            }
            if !running.load(Ordering::Relaxed) {
                log::debug!("run cancelled");
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        driver.read_pc(link)
    }

    // ------------------------------------------------------------------
    // Adapter firmware
    // ------------------------------------------------------------------

    /// Reprogram the adapter's firmware
    ///
    /// The session must be connected in [`Mode::Bootloader`]. The USB
    /// adapter is released afterwards and must be reconnected.
    pub fn update_firmware(&mut self, image: &[u8]) -> Result<()> {
        if self.requested != Mode::Bootloader {
            return Err(Error::NotConnected);
        }
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let adapter = link.adapter();
        let result = firmware::update(link, image, &mut self.progress);
        if adapter == AdapterKind::Usb {
            self.disconnect();
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("requested", &self.requested)
            .field("state", &self.state)
            .field("port", &self.port)
            .field("mode", &self.mode())
            .field("device", &self.device.as_ref().map(|d| d.name.as_str()))
            .field("firmware_version", &self.firmware_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAdapter, FakeTarget, IoLog, MockConnector, SharedAdapter};

    const SERIAL: &str = "/dev/ttyS0";

    fn port_for(kind: AdapterKind) -> &'static str {
        match kind {
            AdapterKind::Serial => SERIAL,
            AdapterKind::Usb => "USB",
        }
    }

    fn rig(kind: AdapterKind, fw: u8, target: Option<FakeTarget>) -> (SharedAdapter, IoLog, MockConnector) {
        let fake = FakeAdapter::new(kind, fw, target).shared();
        let log = IoLog::default();
        let connector = MockConnector::emulated(fake.clone(), log.clone());
        (fake, log, connector)
    }

    fn f020() -> FakeTarget {
        FakeTarget::new(DebugMode::Jtag, 0x0307, 0x10000, 512)
    }

    fn f040() -> FakeTarget {
        FakeTarget::new(DebugMode::Jtag, 0x0501, 0x10000, 512)
    }

    fn f310() -> FakeTarget {
        FakeTarget::new(DebugMode::C2, 0x0801, 0x4000, 512)
    }

    fn connected(
        kind: AdapterKind,
        mode: Mode,
        target: FakeTarget,
    ) -> (Session, SharedAdapter, IoLog) {
        let fw = kind.firmware_window().0;
        let (fake, log, connector) = rig(kind, fw, Some(target));
        let mut session = Session::new(mode);
        session
            .connect(port_for(kind), &connector, &DeviceDb::builtin())
            .unwrap();
        (session, fake, log)
    }

    #[test]
    fn test_auto_probe_falls_back_to_jtag() {
        let (_, log, connector) = rig(AdapterKind::Serial, 0x13, Some(f020()));
        let mut session = Session::new(Mode::Auto);
        session
            .connect(SERIAL, &connector, &DeviceDb::builtin())
            .unwrap();

        assert_eq!(connector.opens(), 2);
        assert_eq!(log.closes(), 1);
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.mode(), Some(DebugMode::Jtag));
        assert_eq!(session.device().unwrap().name, "C8051F020");
        assert!(log.contains(&[0x22]));
        assert!(log.contains(&[0x0A, 0x00]));
    }

    #[test]
    fn test_auto_probe_keeps_c2() {
        let (_, log, connector) = rig(AdapterKind::Usb, 0x07, Some(f310()));
        let mut session = Session::new(Mode::Auto);
        session.connect("USB", &connector, &DeviceDb::builtin()).unwrap();
        assert_eq!(connector.opens(), 1);
        assert_eq!(log.closes(), 0);
        assert_eq!(session.mode(), Some(DebugMode::C2));
        assert_eq!(session.device().unwrap().name, "C8051F310");
        assert_eq!(session.firmware_version(), Some(0x07));
    }

    #[test]
    fn test_old_firmware_rejected() {
        let (_, log, connector) = rig(AdapterKind::Serial, 0x12, Some(f020()));
        let mut session = Session::new(Mode::Jtag);
        let err = session
            .connect(SERIAL, &connector, &DeviceDb::builtin())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionIncompatible {
                version: 0x12,
                min: 0x13,
                ..
            }
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(log.closes(), 1);
        assert!(!log.contains(&[0x04]));
    }

    #[test]
    fn test_newer_firmware_accepted() {
        let (_, _, connector) = rig(AdapterKind::Usb, 0x0b, Some(f310()));
        let mut session = Session::new(Mode::C2);
        session.connect("USB", &connector, &DeviceDb::builtin()).unwrap();
        assert!(session.is_connected());
    }

    #[test]
    fn test_no_target() {
        let (_, log, connector) = rig(AdapterKind::Serial, 0x13, None);
        let mut session = Session::new(Mode::Jtag);
        assert!(matches!(
            session.connect(SERIAL, &connector, &DeviceDb::builtin()),
            Err(Error::TargetAbsent(0xFF00))
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_explicit_wrong_mode_is_not_retried() {
        let (_, _, connector) = rig(AdapterKind::Serial, 0x13, Some(f020()));
        let mut session = Session::new(Mode::C2);
        assert!(matches!(
            session.connect(SERIAL, &connector, &DeviceDb::builtin()),
            Err(Error::TargetAbsent(0xFFFF))
        ));
        assert_eq!(connector.opens(), 1);
    }

    #[test]
    fn test_unknown_device() {
        let target = FakeTarget::new(DebugMode::C2, 0x7701, 0x4000, 512);
        let (_, _, connector) = rig(AdapterKind::Usb, 0x07, Some(target));
        let mut session = Session::new(Mode::C2);
        assert!(matches!(
            session.connect("USB", &connector, &DeviceDb::builtin()),
            Err(Error::UnknownDevice { family: 0x77, .. })
        ));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_unique_id_selects_variant() {
        let mut target = FakeTarget::new(DebugMode::C2, 0x0F00, 0x8000, 512);
        target.unique_id = 1;
        let (session, _, _) = connected(AdapterKind::Usb, Mode::C2, target);
        assert_eq!(session.device().unwrap().name, "C8051F341");
    }

    #[test]
    fn test_wrong_port_kind() {
        let (_, _, connector) = rig(AdapterKind::Serial, 0x13, Some(f020()));
        let mut session = Session::new(Mode::Jtag);
        assert!(matches!(
            session.connect("USB", &connector, &DeviceDb::builtin()),
            Err(Error::TransportOpen(_))
        ));
        assert!(matches!(
            session.connect("USB:", &connector, &DeviceDb::builtin()),
            Err(Error::InvalidPort(_))
        ));
    }

    #[test]
    fn test_disconnect_releases_once() {
        let (mut session, _, log) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        session.disconnect();
        session.disconnect();
        assert_eq!(log.closes(), 1);
        assert!(!log.contains(&[0x1B, 0x00]));
        assert!(matches!(session.read_pc(), Err(Error::NotConnected)));
        drop(session);
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (session, _, log) = connected(AdapterKind::Usb, Mode::C2, f310());
        assert!(!log.contains(&[0x21]));
        drop(session);
        assert!(log.contains(&[0x21]));
        assert_eq!(log.closes(), 1);
    }

    #[test]
    fn test_ram_and_sfr_bounds() {
        let (mut session, _, log) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        let before = log.write_count();
        let mut buf = [0u8; 0x20];
        assert!(matches!(
            session.read_ram(0xF0, &mut buf),
            Err(Error::RangeViolation {
                space: AddressSpace::Ram,
                ..
            })
        ));
        assert!(session.read_sfr(0x7F).is_err());
        assert!(session.write_sfr(0x20, 0).is_err());
        assert!(session.read_xdata(0xFFF0, &mut buf).is_err());
        assert_eq!(log.write_count(), before);

        session.write_ram(0x30, &[1, 2, 3]).unwrap();
        let mut back = [0u8; 3];
        session.read_ram(0x30, &mut back).unwrap();
        assert_eq!(back, [1, 2, 3]);
    }

    #[test]
    fn test_sfr_fixup() {
        let (mut session, fake, log) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        fake.target(|t| t.sfr[0x23] = 0x18);
        assert_eq!(session.read_sfr(0xD0).unwrap(), 0x18);
        assert_eq!(log.writes().last().unwrap(), &vec![0x02, 0x02, 0x23, 0x01]);
        session.write_sfr(0xE0, 0x55).unwrap();
        assert_eq!(fake.target(|t| t.sfr[0x22]), 0x55);
        session.write_sfr(0x90, 0xAA).unwrap();
        assert_eq!(fake.target(|t| t.sfr[0x90]), 0xAA);
    }

    #[test]
    fn test_paged_sfr_restores_page() {
        let (mut session, fake, log) = connected(AdapterKind::Serial, Mode::Jtag, f040());
        fake.target(|t| t.sfr[0x84] = 0x00);
        let reg = PagedRegister {
            page: 0x0F,
            addr: 0x8F,
        };
        session.write_paged_sfr(reg, 0xAB).unwrap();
        let writes = log.writes();
        let tail = &writes[writes.len() - 4..];
        assert_eq!(tail[0], vec![0x02, 0x02, 0x84, 0x01]);
        assert_eq!(tail[1], vec![0x03, 0x02, 0x84, 0x0F]);
        assert_eq!(tail[2], vec![0x03, 0x02, 0x8F, 0xAB]);
        assert_eq!(tail[3], vec![0x03, 0x02, 0x84, 0x00]);
        assert_eq!(session.read_paged_sfr(reg).unwrap(), 0xAB);
    }

    #[test]
    fn test_unpaged_device_ignores_page() {
        let (mut session, _, log) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        let before = log.write_count();
        let reg = PagedRegister {
            page: 0x0F,
            addr: 0x8F,
        };
        session.write_paged_sfr(reg, 0x12).unwrap();
        assert_eq!(log.write_count(), before + 1);
    }

    #[test]
    fn test_active_regs() {
        let (mut session, fake, _) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        fake.target(|t| {
            t.sfr[0x23] = 0x18;
            for i in 0..8 {
                t.ram[0x18 + i] = 0x10 + i as u8;
            }
            t.sfr[0x24] = 0xA0;
            t.sfr[0x25] = 0xA1;
        });
        assert_eq!(
            session.read_active_regs().unwrap(),
            [0xA0, 0xA1, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]
        );
    }

    #[test]
    fn test_xdata_across_pages() {
        let (mut session, fake, _) = connected(AdapterKind::Usb, Mode::C2, f310());
        let data: Vec<u8> = (1..=20).collect();
        session.write_xdata(0x01FA, &data).unwrap();
        assert_eq!(fake.target(|t| t.xdata[0x01FA..0x020E].to_vec()), data);
        let mut back = vec![0u8; data.len()];
        session.read_xdata(0x01FA, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_flash_keep_write() {
        let (mut session, fake, _) = connected(AdapterKind::Usb, Mode::C2, f310());
        session.write_flash(0x0400, &[0xA5; 512]).unwrap();
        session.write_flash_auto_keep(0x0480, &[0x3C; 16]).unwrap();
        fake.target(|t| {
            assert_eq!(t.flash[0x047F], 0xA5);
            assert_eq!(t.flash[0x0480..0x0490], [0x3C; 16]);
            assert_eq!(t.flash[0x0490], 0xA5);
        });
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn test_paged_flash_operations_report_progress() {
        use std::sync::{Arc, Mutex};

        let (mut session, fake, _) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.set_progress_callback(Box::new(move |p| sink.lock().unwrap().push(p)));

        session.write_flash(0, &[0x55; 2048]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 50, 75, 100]);
        assert_eq!(fake.target(|t| t.flash[0x7FF]), 0x55);

        seen.lock().unwrap().clear();
        let mut back = [0u8; 2048];
        session.read_flash(0, &mut back).unwrap();
        assert_eq!(back, [0x55; 2048]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 50, 75, 100]);

        seen.lock().unwrap().clear();
        session.erase_scratchpad().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    }

    #[test]
    fn test_reserved_flash_rejected_without_io() {
        let (mut session, fake, log) = connected(AdapterKind::Usb, Mode::C2, f310());
        let before = log.write_count();
        assert!(matches!(
            session.write_flash_auto_erase(0x3DF0, &[0; 0x20]),
            Err(Error::ReservedFlash { .. })
        ));
        assert!(session.erase_flash_sector(0x3E00).is_err());
        assert_eq!(log.write_count(), before);
        assert_eq!(fake.target(|t| t.sector_erases), 0);
    }

    #[test]
    fn test_c2_scratchpad_rejected_without_io() {
        let (mut session, _, log) = connected(AdapterKind::Usb, Mode::C2, f310());
        let before = log.write_count();
        let mut buf = [0u8; 8];
        assert!(matches!(
            session.read_scratchpad(0, &mut buf),
            Err(Error::ScratchpadUnsupported)
        ));
        assert!(matches!(
            session.write_scratchpad_merge(0, &buf),
            Err(Error::ScratchpadUnsupported)
        ));
        assert_eq!(log.write_count(), before);
    }

    #[test]
    fn test_jtag_scratchpad() {
        let (mut session, fake, _) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        session.erase_scratchpad().unwrap();
        session.write_scratchpad(4, b"ec2").unwrap();
        session.write_scratchpad_merge(0, &[0x01]).unwrap();
        let mut back = [0u8; 8];
        session.read_scratchpad(0, &mut back).unwrap();
        assert_eq!(back, [0x01, 0xFF, 0xFF, 0xFF, b'e', b'c', b'2', 0xFF]);
        assert_eq!(fake.target(|t| t.scratch[4]), b'e');
    }

    #[test]
    fn test_run_to_breakpoint() {
        let (mut session, fake, log) = connected(AdapterKind::Serial, Mode::Jtag, f020());
        assert_eq!(session.add_breakpoint(0x1234).unwrap(), 0);
        assert_eq!(fake.target(|t| t.bp_mask), 0x01);
        assert!(session.is_breakpoint(0x1234));

        let running = AtomicBool::new(true);
        assert_eq!(session.run_to_breakpoint(&running).unwrap(), 0x1234);
        // serial adapter sends no comparator preamble
        assert!(!log.contains(&[0x0C, 0x02, 0xA0, 0x10]));

        session.remove_breakpoint(0x1234).unwrap();
        assert_eq!(fake.target(|t| t.bp_mask), 0x00);
    }

    #[test]
    fn test_run_preamble_on_usb() {
        let (mut session, fake, log) = connected(AdapterKind::Usb, Mode::C2, f310());
        session.add_breakpoint(0x0100).unwrap();
        let running = AtomicBool::new(true);
        assert_eq!(session.run_to_breakpoint(&running).unwrap(), 0x0100);
        for step in RUN_PREAMBLE.steps {
            assert!(log.contains(step.tx));
        }
        assert!(fake.target(|t| t.halted));
    }

    #[test]
    fn test_run_cancelled() {
        let mut target = f020();
        target.polls_until_halt = u32::MAX;
        let (mut session, fake, _) = connected(AdapterKind::Serial, Mode::Jtag, target);
        session.set_pc(0x0042).unwrap();
        let running = AtomicBool::new(false);
        assert_eq!(session.run_to_breakpoint(&running).unwrap(), 0x0042);
        assert!(!fake.target(|t| t.halted));
        session.halt().unwrap();
        assert!(session.halt_poll().unwrap());
    }

    #[test]
    fn test_step_and_reset() {
        let (mut session, _, _) = connected(AdapterKind::Usb, Mode::C2, f310());
        session.set_pc(0x0100).unwrap();
        assert_eq!(session.step().unwrap(), 0x0101);
        assert_eq!(session.read_pc().unwrap(), 0x0101);
        session.reset_target().unwrap();
        assert_eq!(session.read_pc().unwrap(), 0x0000);
    }

    #[test]
    fn test_bootloader_mode_skips_target() {
        let (fake, log, connector) = rig(AdapterKind::Serial, 0x13, Some(f020()));
        let mut session = Session::new(Mode::Bootloader);
        session.connect(SERIAL, &connector, &DeviceDb::builtin()).unwrap();
        assert_eq!(session.state(), ConnectionState::TransportOpen);
        assert_eq!(log.write_count(), 0);
        assert!(matches!(session.read_pc(), Err(Error::NotConnected)));

        let image = vec![0x00u8; firmware::image_size(AdapterKind::Serial)];
        session.update_firmware(&image).unwrap();
        assert_eq!(fake.with(|a| a.blocks.len()), 14);
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn test_usb_firmware_update_disconnects() {
        let (_, log, connector) = rig(AdapterKind::Usb, 0x07, None);
        let mut session = Session::new(Mode::Bootloader);
        session.connect("USB", &connector, &DeviceDb::builtin()).unwrap();
        let image = vec![0x00u8; firmware::image_size(AdapterKind::Usb)];
        session.update_firmware(&image).unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(log.closes(), 1);
    }
}
