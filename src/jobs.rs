//! Launching external programs.
//!
//! Foreground programs are tracked in the [`ForegroundSlot`] and raced against
//! the [`Countdown`]; background programs are reported and left alone.

use crate::command::{CommandRequest, ExitCode};
use crate::signals::{Countdown, ForegroundSlot, restore_default_interrupt};
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc::STDOUT_FILENO;
use nix::sys::stat::Mode;
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::{self, Pid};
use std::ffi::{CStr, CString};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, info, warn};

/// How an external command ended, from the shell's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Foreground program exited normally with this status.
    Exited(ExitCode),
    /// Foreground program was terminated by this signal number.
    Signaled(i32),
    /// Program was started in the background and not waited for.
    Background(Pid),
}

/// Runs every request the built-ins don't claim.
pub struct JobController {
    slot: ForegroundSlot,
    countdown: Box<dyn Countdown>,
}

impl JobController {
    /// `slot` is the handle shared with the signal mediator.
    pub fn new(slot: ForegroundSlot, countdown: Box<dyn Countdown>) -> Self {
        Self { slot, countdown }
    }

    pub fn slot(&self) -> &ForegroundSlot {
        &self.slot
    }

    /// Spawn `request` and, unless it is a background request, wait for it.
    ///
    /// Status lines for the user are written to `stdout`: the pid of a
    /// background program, or the status of a foreground program that exited
    /// non-zero. Failing to set up the redirect target or to start the program
    /// is returned as an error; the child has exited by then.
    pub fn execute(
        &self,
        request: &CommandRequest,
        stdout: &mut dyn Write,
    ) -> Result<JobOutcome> {
        let child = spawn(request)?;
        let pid = Pid::from_raw(child.id() as i32);
        info!(%pid, program = request.program(), background = request.background, "spawned");

        if request.background {
            writeln!(stdout, "Process running in the background with PID: {}", pid)?;
            return Ok(JobOutcome::Background(pid));
        }

        let status = self.wait_foreground(child, pid)?;
        debug!(%pid, %status, "foreground process finished");

        match (status.code(), status.signal()) {
            (Some(code), _) => {
                if code != 0 {
                    writeln!(stdout, "An error occurred with status {}.", code)?;
                }
                Ok(JobOutcome::Exited(code))
            }
            (None, Some(signal)) => Ok(JobOutcome::Signaled(signal)),
            (None, None) => Ok(JobOutcome::Exited(-1)),
        }
    }

    fn wait_foreground(&self, mut child: Child, pid: Pid) -> Result<ExitStatus> {
        self.slot.track(pid);
        self.slot.set_deadline(self.countdown.arm());

        // The slot is emptied while the child is still a zombie, so its pid
        // cannot be recycled under a late interrupt or timeout.
        if let Err(e) = wait_until_exited(pid) {
            warn!(%pid, error = %e, "waitid failed");
        }
        self.countdown.disarm();
        self.slot.take();

        child
            .wait()
            .with_context(|| format!("failed to wait for process {}", pid))
    }
}

/// Block until `pid` has terminated, leaving it unreaped.
fn wait_until_exited(pid: Pid) -> nix::Result<()> {
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => continue,
            result => return result.map(|_| ()),
        }
    }
}

fn spawn(request: &CommandRequest) -> Result<Child> {
    let mut cmd = Command::new(request.program());
    cmd.args(request.args());

    let target = match &request.redirect {
        Some(path) => Some(
            CString::new(path.as_os_str().as_bytes())
                .with_context(|| format!("open error: {}", path.display()))?,
        ),
        None => None,
    };

    // SAFETY: the hook runs between fork and exec; sigaction, open, dup2 and
    // close are async-signal-safe and nothing here allocates.
    unsafe {
        cmd.pre_exec(move || {
            restore_default_interrupt().map_err(io::Error::from)?;
            if let Some(target) = &target {
                redirect_stdout(target).map_err(io::Error::from)?;
            }
            Ok(())
        });
    }

    cmd.spawn().with_context(|| match &request.redirect {
        Some(path) => format!("{} > {}", request.program(), path.display()),
        None => request.program().to_string(),
    })
}

/// Point standard output at `target`, created with mode 0644 or truncated.
fn redirect_stdout(target: &CStr) -> nix::Result<()> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    let fd = fcntl::open(
        target,
        OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
        mode,
    )?;
    if fd != STDOUT_FILENO {
        unistd::dup2(fd, STDOUT_FILENO)?;
        unistd::close(fd)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{enforce_timeout, forward_interrupt};
    use nix::sys::signal::{Signal, kill};
    use nix::sys::wait::{WaitStatus, waitpid};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Armed(Option<Pid>),
        /// Seen while disarming: the slot still names a finished, unreaped child.
        Unreaped(Pid),
        Disarmed,
    }

    /// Records calls and, when asked, plays the part of the signal mediator.
    #[derive(Clone, Default)]
    struct FakeCountdown {
        slot: ForegroundSlot,
        events: Arc<Mutex<Vec<Event>>>,
        on_arm: Option<fn(&ForegroundSlot)>,
    }

    impl Countdown for FakeCountdown {
        fn arm(&self) -> Option<Instant> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Armed(self.slot.current()));
            if let Some(react) = self.on_arm {
                let slot = self.slot.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(200));
                    react(&slot);
                });
            }
            // already due, so a timeout reaction applies immediately
            Some(Instant::now())
        }

        fn disarm(&self) {
            let mut events = self.events.lock().unwrap();
            if let Some(pid) = self.slot.current() {
                let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
                if let Ok(WaitStatus::Exited(..)) = waitid(Id::Pid(pid), flags) {
                    events.push(Event::Unreaped(pid));
                }
            }
            events.push(Event::Disarmed);
        }
    }

    fn controller(on_arm: Option<fn(&ForegroundSlot)>) -> (JobController, FakeCountdown) {
        let countdown = FakeCountdown {
            on_arm,
            ..FakeCountdown::default()
        };
        let jobs = JobController::new(countdown.slot.clone(), Box::new(countdown.clone()));
        (jobs, countdown)
    }

    fn request(argv: &[&str]) -> CommandRequest {
        CommandRequest::new(argv.iter().map(|s| s.to_string()).collect(), None, false).unwrap()
    }

    fn events(countdown: &FakeCountdown) -> Vec<Event> {
        countdown.events.lock().unwrap().clone()
    }

    #[test]
    fn test_foreground_success_is_silent() {
        let (jobs, _) = controller(None);
        let mut out: Vec<u8> = Vec::new();

        let outcome = jobs.execute(&request(&["true"]), &mut out).unwrap();

        assert_eq!(outcome, JobOutcome::Exited(0));
        assert!(out.is_empty());
        assert_eq!(jobs.slot().current(), None);
    }

    #[test]
    fn test_slot_is_set_while_countdown_is_armed() {
        let (jobs, countdown) = controller(None);
        jobs.execute(&request(&["true"]), &mut Vec::<u8>::new()).unwrap();

        let events = events(&countdown);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::Armed(Some(_))));
        assert_eq!(events.last(), Some(&Event::Disarmed));
        assert_eq!(jobs.slot().current(), None);
    }

    #[test]
    fn test_nonzero_status_is_reported() {
        let (jobs, _) = controller(None);
        let mut out: Vec<u8> = Vec::new();

        let outcome = jobs
            .execute(&request(&["sh", "-c", "exit 3"]), &mut out)
            .unwrap();

        assert_eq!(outcome, JobOutcome::Exited(3));
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "An error occurred with status 3.\n"
        );
    }

    #[test]
    fn test_redirect_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        fs::write(&target, "stale contents that must disappear\n").unwrap();

        let (jobs, _) = controller(None);
        let mut req = request(&["sh", "-c", "echo redirected"]);
        req.redirect = Some(target.clone());
        let mut out: Vec<u8> = Vec::new();

        let outcome = jobs.execute(&req, &mut out).unwrap();

        assert_eq!(outcome, JobOutcome::Exited(0));
        assert!(out.is_empty());
        assert_eq!(fs::read_to_string(&target).unwrap(), "redirected\n");
    }

    #[test]
    fn test_unopenable_redirect_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (jobs, countdown) = controller(None);
        let mut req = request(&["true"]);
        req.redirect = Some(dir.path().join("missing").join("out.txt"));

        let err = jobs.execute(&req, &mut Vec::<u8>::new()).unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.starts_with("true > "), "{}", message);
        assert!(message.contains("out.txt"), "{}", message);
        assert!(events(&countdown).is_empty());
        assert_eq!(jobs.slot().current(), None);
    }

    #[test]
    fn test_redirect_creates_file_with_regular_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh.txt");
        let (jobs, _) = controller(None);
        let mut req = request(&["true"]);
        req.redirect = Some(target.clone());

        jobs.execute(&req, &mut Vec::<u8>::new()).unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & !0o644, 0, "mode {:o}", mode);
        assert_eq!(fs::read_to_string(&target).unwrap(), "");
    }

    #[test]
    fn test_slot_is_emptied_before_the_child_is_reaped() {
        let (jobs, countdown) = controller(None);
        jobs.execute(&request(&["true"]), &mut Vec::<u8>::new()).unwrap();

        let events = events(&countdown);
        let Event::Armed(Some(pid)) = events[0] else {
            panic!("Expected an armed event, got {:?}", events);
        };
        assert_eq!(events[1], Event::Unreaped(pid));
        assert_eq!(events[2], Event::Disarmed);
    }

    #[test]
    fn test_missing_program_is_reported_and_nothing_tracked() {
        let (jobs, countdown) = controller(None);
        let err = jobs
            .execute(&request(&["badcommand123"]), &mut Vec::<u8>::new())
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.starts_with("badcommand123: "), "{}", message);
        assert!(events(&countdown).is_empty());
        assert_eq!(jobs.slot().current(), None);
    }

    #[test]
    fn test_background_returns_immediately() {
        let (jobs, countdown) = controller(None);
        let mut req = request(&["sleep", "5"]);
        req.background = true;
        let mut out: Vec<u8> = Vec::new();

        let started = Instant::now();
        let outcome = jobs.execute(&req, &mut out).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        let JobOutcome::Background(pid) = outcome else {
            panic!("Expected a background outcome, got {:?}", outcome);
        };
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("Process running in the background with PID: {}\n", pid)
        );
        assert!(events(&countdown).is_empty());
        assert_eq!(jobs.slot().current(), None);

        kill(pid, Signal::SIGKILL).unwrap();
        waitpid(pid, None).unwrap();
    }

    #[test]
    fn test_timeout_kills_foreground_without_status_report() {
        let (jobs, countdown) = controller(Some(|slot| {
            enforce_timeout(slot, 10, &mut Vec::<u8>::new()).unwrap();
        }));
        let mut out: Vec<u8> = Vec::new();

        let started = Instant::now();
        let outcome = jobs.execute(&request(&["sleep", "30"]), &mut out).unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome, JobOutcome::Signaled(Signal::SIGKILL as i32));
        assert!(out.is_empty());
        assert_eq!(events(&countdown).last(), Some(&Event::Disarmed));
        assert_eq!(jobs.slot().current(), None);
    }

    #[test]
    fn test_interrupt_reaches_foreground_process() {
        let (jobs, _) = controller(Some(|slot| {
            forward_interrupt(slot, "> ", &mut Vec::<u8>::new()).unwrap();
        }));

        let started = Instant::now();
        let outcome = jobs
            .execute(&request(&["sleep", "30"]), &mut Vec::<u8>::new())
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome, JobOutcome::Signaled(Signal::SIGINT as i32));
        assert_eq!(jobs.slot().current(), None);
    }
}
