//! Interrupt delegation and the foreground timeout.
//!
//! The only state shared between the prompt loop and signal reactions is the
//! [`ForegroundSlot`]. Signals are caught with `signal-hook`, whose low-level
//! handler just queues the signal number; the reaction itself runs on the
//! mediator thread, where formatting output and taking a lock are safe.

use crate::config::ShellConfig;
use crate::interpreter::render_prompt;
use anyhow::{Context, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{Pid, alarm};
use signal_hook::consts::{SIGALRM, SIGINT};
use signal_hook::iterator::{Handle, Signals};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The process currently running in the foreground, if any.
///
/// Cloning yields another handle to the same slot. The job controller writes
/// it around each foreground wait; the mediator only reads and takes from it.
/// Alongside the pid the slot keeps the deadline of the countdown armed for
/// that process, so a timeout queued for an earlier process is ignored.
#[derive(Debug, Clone, Default)]
pub struct ForegroundSlot {
    inner: Arc<Mutex<Foreground>>,
}

#[derive(Debug, Default)]
struct Foreground {
    pid: Option<Pid>,
    deadline: Option<Instant>,
}

impl Foreground {
    fn take_expired(&mut self, now: Instant) -> Option<Pid> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.pid.take()
            }
            _ => None,
        }
    }
}

impl ForegroundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pid` as the foreground process, with no countdown yet.
    pub fn track(&self, pid: Pid) {
        *self.lock() = Foreground {
            pid: Some(pid),
            deadline: None,
        };
    }

    /// Set when the countdown for the tracked process runs out.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.lock().deadline = deadline;
    }

    pub fn current(&self) -> Option<Pid> {
        self.lock().pid
    }

    /// Empty the slot, returning the pid it held.
    pub fn take(&self) -> Option<Pid> {
        let mut fg = self.lock();
        fg.deadline = None;
        fg.pid.take()
    }

    // A panic while holding the lock cannot leave the slot half-written.
    fn lock(&self) -> MutexGuard<'_, Foreground> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One-shot timer bound to the foreground wait.
pub trait Countdown {
    /// Start (or restart) the countdown and return when it will fire.
    fn arm(&self) -> Option<Instant>;
    /// Cancel a pending countdown; no-op if none is pending.
    fn disarm(&self);
}

/// [`Countdown`] backed by `alarm(2)`; expiry raises SIGALRM.
#[derive(Debug, Clone, Copy)]
pub struct AlarmCountdown {
    seconds: u32,
}

impl AlarmCountdown {
    pub fn new(seconds: u32) -> Self {
        Self { seconds }
    }
}

impl Countdown for AlarmCountdown {
    fn arm(&self) -> Option<Instant> {
        // taken before the timer starts, so it never lies after the real expiry
        let deadline = Instant::now() + Duration::from_secs(u64::from(self.seconds));
        let _ = alarm::set(self.seconds);
        Some(deadline)
    }

    fn disarm(&self) {
        let _ = alarm::cancel();
    }
}

/// React to an interrupt.
///
/// With a foreground process the interrupt is passed on to it; otherwise the
/// shell is idle at the prompt and the prompt is drawn again.
pub fn forward_interrupt(
    slot: &ForegroundSlot,
    marker: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    let current = slot.lock();
    if let Some(pid) = current.pid {
        debug!(%pid, "forwarding SIGINT to foreground process");
        if let Err(e) = signal::kill(pid, Signal::SIGINT) {
            warn!(%pid, error = %e, "failed to forward SIGINT");
        }
        return Ok(());
    }
    drop(current);

    write!(out, "\n{}", render_prompt(marker))?;
    out.flush()
}

/// React to the countdown expiring.
///
/// Kills the foreground process, if one is still tracked and its deadline
/// has passed, and clears the slot. Otherwise the signal belongs to a process
/// that already finished and nothing happens.
pub fn enforce_timeout(
    slot: &ForegroundSlot,
    limit_secs: u32,
    out: &mut dyn Write,
) -> io::Result<()> {
    let pid = {
        let mut current = slot.lock();
        let Some(pid) = current.take_expired(Instant::now()) else {
            debug!("stale timeout ignored");
            return Ok(());
        };
        // still under the lock, so the job controller has not reaped it
        if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
            warn!(%pid, error = %e, "failed to kill timed out process");
        }
        pid
    };
    info!(%pid, limit_secs, "foreground process timed out");
    writeln!(
        out,
        "\nForeground process exceeded time limit of {} seconds. Terminating...",
        limit_secs
    )?;
    out.flush()
}

/// Put SIGINT back to its default disposition.
///
/// Meant for a freshly forked child before `exec`: it only calls
/// `sigaction`, which is async-signal-safe.
pub fn restore_default_interrupt() -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_DFL does not run any Rust code in signal context.
    unsafe { signal::sigaction(Signal::SIGINT, &default) }.map(|_| ())
}

/// Owns the signal registration and the thread that reacts to it.
///
/// Dropping the mediator unregisters the handlers and joins the thread.
pub struct SignalMediator {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalMediator {
    /// Catch SIGINT and SIGALRM and react to them against `slot`.
    pub fn install(slot: ForegroundSlot, config: &ShellConfig) -> Result<Self> {
        let mut signals =
            Signals::new([SIGINT, SIGALRM]).context("failed to register signal handlers")?;
        let handle = signals.handle();
        let limit_secs = config.timeout_secs;
        let marker = config.marker.clone();

        let thread = thread::Builder::new()
            .name("signal-mediator".to_string())
            .spawn(move || {
                debug!("signal mediator started");
                for signal in signals.forever() {
                    let mut out = io::stdout();
                    let result = match signal {
                        SIGINT => forward_interrupt(&slot, &marker, &mut out),
                        SIGALRM => enforce_timeout(&slot, limit_secs, &mut out),
                        _ => Ok(()),
                    };
                    if let Err(e) = result {
                        warn!(signal, error = %e, "failed to report signal");
                    }
                }
                debug!("signal mediator stopped");
            })
            .context("failed to start signal mediator")?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalMediator {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
