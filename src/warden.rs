//! The Warden - workload supervisor
//!
//! Owns PID 1 for the life of the container:
//! - Spawns the workload and announces it on the banner stream
//! - Forwards signals to the workload
//! - Reaps orphaned descendants when running as PID 1
//! - Exits with the workload's status, or 0 after a requested shutdown

use std::fmt;
use std::io::Write;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, Pid};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::banner::Banner;
use crate::error::{Error, Result};
use crate::identity::join_argv;
use crate::launch;
use crate::signals::{Event, EventSource};

/// How the workload ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal
    Signaled(Signal),
}

impl ExitStatus {
    /// Shell-style exit code: the status, or 128 + signal number
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Code(code) => *code,
            ExitStatus::Signaled(sig) => 128 + *sig as i32,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "status {}", code),
            ExitStatus::Signaled(sig) => write!(f, "killed by {}", sig),
        }
    }
}

/// Which children the Warden collects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapScope {
    /// Every exited child, including re-parented orphans (PID 1)
    All,
    /// Only the workload
    Workload,
}

impl ReapScope {
    /// Reap everything only when orphans are actually re-parented to us
    pub fn detect() -> Self {
        if getpid().as_raw() == 1 {
            ReapScope::All
        } else {
            ReapScope::Workload
        }
    }
}

/// The Warden supervises a single workload process
pub struct Warden<W: Write> {
    /// Status line output
    banner: Banner<W>,
    /// Grace period between a forwarded shutdown signal and SIGKILL
    stop_timeout: Duration,
    /// Children collected on SIGCHLD
    scope: ReapScope,
    /// Keep PID 1 alive after the workload exits, until a shutdown signal
    hold: bool,
}

impl<W: Write> Warden<W> {
    pub fn new(banner: Banner<W>, stop_timeout: Duration) -> Self {
        Self {
            banner,
            stop_timeout,
            scope: ReapScope::detect(),
            hold: false,
        }
    }

    /// Stay up after the workload exits so the container keeps running
    pub fn hold_after_exit(mut self, hold: bool) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_scope(mut self, scope: ReapScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn banner(&self) -> &Banner<W> {
        &self.banner
    }

    /// Run `command` until it exits or a shutdown signal arrives
    ///
    /// With [`Warden::hold_after_exit`] the workload exiting does not end the
    /// run; only a shutdown signal does. `events` must be live before this is called so nothing sent during
    /// startup is missed. Returns the exit code for the container runtime.
    pub async fn run<S: EventSource>(&mut self, events: &mut S, command: &[String]) -> Result<i32> {
        self.banner.configuring();
        self.banner.connecting();

        let pid = launch::spawn(command)?;
        self.banner.starting(&join_argv(command));
        self.banner.ready(pid.as_raw());
        info!(pid = pid.as_raw(), scope = ?self.scope, "workload started");

        // A short-lived workload may be gone before the first event is polled
        if let Some(status) = self.reap(pid)? {
            return self.exited(events, pid, status).await;
        }

        loop {
            match events.next().await {
                Event::ChildChanged => {
                    if let Some(status) = self.reap(pid)? {
                        return self.exited(events, pid, status).await;
                    }
                }
                Event::Forward(sig) => {
                    debug!(signal = %sig, "forwarding signal to workload");
                    self.forward(pid, sig)?;
                }
                Event::Shutdown(sig) => {
                    self.banner.shutdown(sig);
                    return self.stop(events, pid, sig).await;
                }
            }
        }
    }

    /// Workload ended on its own
    async fn exited<S: EventSource>(&mut self, events: &mut S, pid: Pid, status: ExitStatus) -> Result<i32> {
        let code = self.finish(status);
        if !self.hold {
            return Ok(code);
        }

        self.banner.holding();
        loop {
            match events.next().await {
                Event::ChildChanged => {
                    // Orphans still need collecting; the workload is already gone
                    self.reap(pid)?;
                }
                Event::Forward(sig) => {
                    debug!(signal = %sig, "workload gone, signal dropped");
                }
                Event::Shutdown(sig) => {
                    self.banner.shutdown(sig);
                    info!(code, "shutting down after workload exit");
                    return Ok(code);
                }
            }
        }
    }

    /// Forward `sig`, wait out the grace period, then kill the process group
    async fn stop<S: EventSource>(&mut self, events: &mut S, pid: Pid, sig: Signal) -> Result<i32> {
        self.forward(pid, sig)?;

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            match timeout_at(deadline, events.next()).await {
                Ok(Event::ChildChanged) => {
                    if let Some(status) = self.reap(pid)? {
                        return Ok(self.stopped(sig, status));
                    }
                }
                Ok(Event::Forward(other)) => self.forward(pid, other)?,
                Ok(Event::Shutdown(again)) => {
                    info!(signal = %again, "repeated shutdown request, not waiting");
                    break;
                }
                Err(_) => {
                    warn!(
                        timeout_secs = self.stop_timeout.as_secs(),
                        "workload ignored shutdown signal"
                    );
                    break;
                }
            }
        }

        self.banner.killing(pid.as_raw());
        match killpg(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                return Err(Error::Forward {
                    signal: Signal::SIGKILL.to_string(),
                    pid: pid.as_raw(),
                    source,
                })
            }
        }

        let status = self.wait_blocking(pid)?;
        Ok(self.stopped(sig, status))
    }

    /// Deliver `sig` to the workload; a workload that already exited is not an error
    fn forward(&self, pid: Pid, sig: Signal) -> Result<()> {
        match kill(pid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(Error::Forward {
                signal: sig.to_string(),
                pid: pid.as_raw(),
                source,
            }),
        }
    }

    /// Collect exited children without blocking
    ///
    /// Returns the workload's status once it has been reaped.
    fn reap(&self, workload: Pid) -> Result<Option<ExitStatus>> {
        let target = match self.scope {
            ReapScope::All => Pid::from_raw(-1),
            ReapScope::Workload => workload,
        };

        let mut result = None;
        loop {
            match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(WaitStatus::Exited(p, code)) if p == workload => {
                    result = Some(ExitStatus::Code(code));
                }
                Ok(WaitStatus::Signaled(p, sig, _)) if p == workload => {
                    result = Some(ExitStatus::Signaled(sig));
                }
                Ok(WaitStatus::Exited(p, _)) | Ok(WaitStatus::Signaled(p, _, _)) => {
                    debug!(pid = p.as_raw(), "reaped orphaned process");
                }
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => return Err(Error::Wait(e)),
            }
        }

        Ok(result)
    }

    /// Block until the workload is gone (used after SIGKILL)
    fn wait_blocking(&self, pid: Pid) -> Result<ExitStatus> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::Code(code)),
                Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ExitStatus::Signaled(sig)),
                Ok(_) | Err(Errno::EINTR) => continue,
                // Already collected by an earlier reap
                Err(Errno::ECHILD) => return Ok(ExitStatus::Signaled(Signal::SIGKILL)),
                Err(e) => return Err(Error::Wait(e)),
            }
        }
    }

    /// Workload ended on its own: propagate its status
    fn finish(&mut self, status: ExitStatus) -> i32 {
        self.banner.exited(&status.to_string());
        status.code()
    }

    /// Workload ended after a requested shutdown
    ///
    /// Death by signal, a clean exit, or the conventional 128 + signal code
    /// count as an orderly stop (0). Any other non-zero code is propagated.
    fn stopped(&mut self, requested: Signal, status: ExitStatus) -> i32 {
        let orderly = match status {
            ExitStatus::Signaled(_) => true,
            ExitStatus::Code(code) => code == 0 || code == 128 + requested as i32,
        };

        if orderly {
            self.banner.stopped();
            0
        } else {
            self.banner.exited(&status.to_string());
            status.code()
        }
    }
}
