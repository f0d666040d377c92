//! Run to breakpoint

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{connect, Target};

/// Clears a running flag once a timeout expires, unless finished first
struct Deadline {
    running: Arc<AtomicBool>,
    done: Sender<()>,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let (done, wait) = mpsc::channel::<()>();
        let flag = Arc::clone(&running);
        let timer = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = wait.recv_timeout(timeout) {
                flag.store(false, Ordering::Relaxed);
            }
        });
        Self {
            running,
            done,
            timer,
        }
    }

    fn flag(&self) -> &AtomicBool {
        &self.running
    }

    /// Stop the timer; returns whether the timeout had already expired
    fn finish(self) -> bool {
        // the timer may have exited already, in which case nobody listens
        let _ = self.done.send(());
        if self.timer.join().is_err() {
            log::warn!("run timer thread panicked");
        }
        !self.running.load(Ordering::Relaxed)
    }
}

/// Set breakpoints, let the target run and report where it stopped
pub fn run_until_breakpoint(
    target: &Target<'_>,
    breakpoints: &[u32],
    timeout: Duration,
    reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = connect(target)?;
    if reset {
        session.reset_target()?;
    }

    session.clear_breakpoints()?;
    for &addr in breakpoints {
        let slot = session.add_breakpoint(addr)?;
        log::info!("Breakpoint {} at 0x{:04x}", slot, addr);
    }

    println!("Running...");
    let deadline = Deadline::start(timeout);
    let result = session.run_to_breakpoint(deadline.flag());
    let expired = deadline.finish();
    let pc = result?;

    if expired && !session.halt_poll()? {
        session.halt()?;
        let pc = session.read_pc()?;
        println!("Timed out after {:?}, halted at 0x{:04X}", timeout, pc);
        return Ok(());
    }

    if session.is_breakpoint(pc as u32) {
        println!("Breakpoint hit at 0x{:04X}", pc);
    } else {
        println!("Halted at 0x{:04X}", pc);
    }
    let regs = session.read_active_regs()?;
    let regs: Vec<String> = regs
        .iter()
        .enumerate()
        .map(|(i, r)| format!("R{}={:02X}", i, r))
        .collect();
    println!("  {}", regs.join(" "));
    Ok(())
}
