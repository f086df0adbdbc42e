//! Signal disposition for the supervisor
//!
//! Signal streams are registered once, before the workload is spawned, so a
//! termination request arriving during startup is queued rather than lost.

use crate::error::{Error, Result};
use nix::sys::signal::Signal;
use std::future::poll_fn;
use std::task::Poll;
use tokio::signal::unix::{signal, SignalKind};

/// What the supervisor does with a received signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forward to the workload, wait for it, then exit
    Shutdown,
    /// Forward to the workload and keep waiting
    Forward,
    /// A child changed state; reap it
    Reap,
}

/// Signals that stop the supervisor
pub const SHUTDOWN_SIGNALS: &[Signal] = &[Signal::SIGTERM, Signal::SIGINT, Signal::SIGQUIT];

/// Signals passed through to the workload untouched
pub const FORWARD_SIGNALS: &[Signal] = &[Signal::SIGHUP, Signal::SIGUSR1, Signal::SIGUSR2];

/// Disposition for `sig`, `None` for signals left at their default action
pub fn disposition(sig: Signal) -> Option<Disposition> {
    if SHUTDOWN_SIGNALS.contains(&sig) {
        Some(Disposition::Shutdown)
    } else if FORWARD_SIGNALS.contains(&sig) {
        Some(Disposition::Forward)
    } else if sig == Signal::SIGCHLD {
        Some(Disposition::Reap)
    } else {
        None
    }
}

/// Supervisor event derived from a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Shutdown(Signal),
    Forward(Signal),
    ChildChanged,
}

impl Event {
    pub fn from_signal(sig: Signal) -> Option<Self> {
        match disposition(sig)? {
            Disposition::Shutdown => Some(Event::Shutdown(sig)),
            Disposition::Forward => Some(Event::Forward(sig)),
            Disposition::Reap => Some(Event::ChildChanged),
        }
    }
}

/// Source of supervisor events
#[allow(async_fn_in_trait)]
pub trait EventSource {
    async fn next(&mut self) -> Event;
}

/// Process-wide signal streams for every signal with a disposition
pub struct SignalSet {
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
}

impl SignalSet {
    /// Register handlers; must run inside a tokio runtime
    pub fn install() -> Result<Self> {
        // Shutdown signals first so a flood of SIGCHLD cannot starve them
        let wanted = SHUTDOWN_SIGNALS
            .iter()
            .chain(FORWARD_SIGNALS)
            .chain(std::iter::once(&Signal::SIGCHLD));

        let mut streams = Vec::new();
        for sig in wanted {
            let stream = signal(SignalKind::from_raw(*sig as i32)).map_err(Error::Signal)?;
            streams.push((*sig, stream));
        }

        Ok(Self { streams })
    }
}

impl EventSource for SignalSet {
    async fn next(&mut self) -> Event {
        poll_fn(|cx| {
            for (sig, stream) in self.streams.iter_mut() {
                if let Poll::Ready(Some(())) = stream.poll_recv(cx)
                    && let Some(event) = Event::from_signal(*sig)
                {
                    return Poll::Ready(event);
                }
            }
            Poll::Pending
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    #[test]
    fn test_termination_signals_shut_down() {
        assert_eq!(disposition(Signal::SIGTERM), Some(Disposition::Shutdown));
        assert_eq!(disposition(Signal::SIGINT), Some(Disposition::Shutdown));
    }

    #[test]
    fn test_hangup_is_forwarded() {
        assert_eq!(
            Event::from_signal(Signal::SIGHUP),
            Some(Event::Forward(Signal::SIGHUP))
        );
    }

    #[test]
    fn test_child_signal_reaps() {
        assert_eq!(Event::from_signal(Signal::SIGCHLD), Some(Event::ChildChanged));
    }

    #[test]
    fn test_unlisted_signal_has_default_action() {
        assert_eq!(disposition(Signal::SIGPIPE), None);
    }

    #[tokio::test]
    async fn test_install_registers_all_streams() {
        let set = SignalSet::install().unwrap();
        assert_eq!(
            set.streams.len(),
            SHUTDOWN_SIGNALS.len() + FORWARD_SIGNALS.len() + 1
        );
    }

    /// Next event matching `want`, skipping anything other tests raised meanwhile
    async fn wait_for(set: &mut SignalSet, want: Event) -> Event {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                let event = set.next().await;
                if event == want {
                    return event;
                }
            }
        })
        .await
        .expect("signal not delivered")
    }

    #[tokio::test]
    async fn test_delivered_sigterm_is_shutdown() {
        let mut set = SignalSet::install().unwrap();
        raise(Signal::SIGTERM).unwrap();
        assert_eq!(
            wait_for(&mut set, Event::Shutdown(Signal::SIGTERM)).await,
            Event::Shutdown(Signal::SIGTERM)
        );
    }

    #[tokio::test]
    async fn test_delivered_sigchld_is_child_changed() {
        let mut set = SignalSet::install().unwrap();
        raise(Signal::SIGCHLD).unwrap();
        assert_eq!(wait_for(&mut set, Event::ChildChanged).await, Event::ChildChanged);
    }
}
