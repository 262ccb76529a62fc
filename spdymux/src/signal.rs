//! # One-Shot Stream Signals
//!
//! Two primitives gate a stream's lifecycle:
//!
//! - **ReplyGate**: single-writer, multi-reader one-shot event. The first
//!   resolution (reply sent, acknowledgement received, or failure) wins and
//!   is broadcast to every waiter, present and future.
//! - **Close signal**: fires once and stays fired. Modeled as a channel that
//!   never carries a message and is disconnected to fire, so a blocked reader
//!   can `select!` on it next to its data queue.

use crate::error::Failure;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Resolution state of a [`ReplyGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyState {
    /// Not yet replied or acknowledged
    Pending,

    /// Reply sent (receiving side) or acknowledgement received (initiating side)
    Replied,

    /// Acknowledgement slot delivered a failure
    Failed(Failure),
}

/// Lock + condition pair guarding the `replied` transition.
#[derive(Debug)]
pub struct ReplyGate {
    state: Mutex<ReplyState>,
    cond: Condvar,
}

impl ReplyGate {
    /// Create a pending gate
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReplyState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ReplyState {
        self.state.lock().clone()
    }

    /// True once the gate resolved successfully
    pub fn is_replied(&self) -> bool {
        *self.state.lock() == ReplyState::Replied
    }

    /// True once the gate resolved either way
    pub fn is_resolved(&self) -> bool {
        *self.state.lock() != ReplyState::Pending
    }

    /// Block until the gate resolves.
    pub fn wait(&self) -> Result<(), Failure> {
        let mut state = self.state.lock();
        while *state == ReplyState::Pending {
            self.cond.wait(&mut state);
        }
        outcome(&state)
    }

    /// Block until the gate resolves or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), Failure>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };

        let mut state = self.state.lock();
        while *state == ReplyState::Pending {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if *state == ReplyState::Pending {
                    return None;
                }
                break;
            }
        }
        Some(outcome(&state))
    }

    /// Resolve the gate with `result` and wake every waiter.
    ///
    /// Returns false if the gate was already resolved; the earlier
    /// resolution stands.
    pub fn resolve(&self, result: Result<(), Failure>) -> bool {
        let mut state = self.state.lock();
        if *state != ReplyState::Pending {
            return false;
        }
        *state = match result {
            Ok(()) => ReplyState::Replied,
            Err(failure) => ReplyState::Failed(failure),
        };
        self.cond.notify_all();
        true
    }

    /// Run `send` under the gate lock and mark the gate replied if it succeeds.
    ///
    /// Returns `Ok(false)` without calling `send` when the gate is already
    /// resolved, so concurrent callers transmit at most once.
    pub fn resolve_with<E>(&self, send: impl FnOnce() -> Result<(), E>) -> Result<bool, E> {
        let mut state = self.state.lock();
        if *state != ReplyState::Pending {
            return Ok(false);
        }
        send()?;
        *state = ReplyState::Replied;
        self.cond.notify_all();
        Ok(true)
    }
}

impl Default for ReplyGate {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome(state: &ReplyState) -> Result<(), Failure> {
    match state {
        ReplyState::Failed(failure) => Err(failure.clone()),
        _ => Ok(()),
    }
}

/// Create a linked close trigger and signal.
pub fn close_signal() -> (CloseTrigger, CloseSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (
        CloseTrigger { _tx: tx },
        CloseSignal {
            fired: AtomicBool::new(false),
            rx,
        },
    )
}

/// Firing half of the close signal. Consumed when fired.
#[derive(Debug)]
pub struct CloseTrigger {
    _tx: Sender<()>,
}

impl CloseTrigger {
    /// Fire the signal. Waiters blocked in `select!` on
    /// [`CloseSignal::receiver`] wake immediately.
    pub fn fire(self, signal: &CloseSignal) {
        signal.fired.store(true, Ordering::Release);
        drop(self);
    }
}

/// Observing half of the close signal.
#[derive(Debug)]
pub struct CloseSignal {
    fired: AtomicBool,
    rx: Receiver<()>,
}

impl CloseSignal {
    /// Check whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the signal fires
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spdymux_proto::RstStatus;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_gate_broadcasts_to_all_waiters() {
        let gate = Arc::new(ReplyGate::new());
        let barrier = Arc::new(Barrier::new(5));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.wait()
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        assert!(gate.resolve(Ok(())));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(()));
        }
        assert!(gate.is_replied());
    }

    #[test]
    fn test_gate_first_resolution_wins() {
        let gate = ReplyGate::new();
        assert!(gate.resolve(Err(Failure::Refused)));
        assert!(!gate.resolve(Ok(())));

        assert_eq!(gate.state(), ReplyState::Failed(Failure::Refused));
        assert_eq!(gate.wait(), Err(Failure::Refused));
        assert!(gate.is_resolved());
        assert!(!gate.is_replied());
    }

    #[test]
    fn test_gate_wait_timeout_expires() {
        let gate = ReplyGate::new();
        let start = Instant::now();
        assert_eq!(gate.wait_timeout(Duration::from_millis(30)), None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_gate_wait_timeout_resolved_early() {
        let gate = Arc::new(ReplyGate::new());
        let resolver = {
            let gate = gate.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                gate.resolve(Err(Failure::Reset(RstStatus::Cancel)))
            })
        };

        assert_eq!(
            gate.wait_timeout(Duration::from_secs(5)),
            Some(Err(Failure::Reset(RstStatus::Cancel)))
        );
        assert!(resolver.join().unwrap());
    }

    #[test]
    fn test_resolve_with_runs_once() {
        let gate = ReplyGate::new();
        let mut sends = 0;

        assert_eq!(gate.resolve_with(|| -> Result<(), ()> { sends += 1; Ok(()) }), Ok(true));
        assert_eq!(gate.resolve_with(|| -> Result<(), ()> { sends += 1; Ok(()) }), Ok(false));
        assert_eq!(sends, 1);
    }

    #[test]
    fn test_resolve_with_failure_stays_pending() {
        let gate = ReplyGate::new();
        assert_eq!(gate.resolve_with(|| Err("boom")), Err("boom"));
        assert_eq!(gate.state(), ReplyState::Pending);
    }

    #[test]
    fn test_close_signal_fires_once_and_stays() {
        let (trigger, signal) = close_signal();
        assert!(!signal.is_fired());
        assert!(signal.receiver().try_recv().is_err());

        trigger.fire(&signal);
        assert!(signal.is_fired());

        // Disconnected receivers are ready forever
        for _ in 0..3 {
            assert_eq!(
                signal.receiver().recv_timeout(Duration::from_secs(1)),
                Err(crossbeam_channel::RecvTimeoutError::Disconnected)
            );
        }
    }
}
