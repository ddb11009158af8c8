//! Run lifecycle: `Idle → Running → Stopping → Stopped`.
//!
//! The controller is the only writer of the state. The poller observes it
//! through a `watch` receiver and stops scheduling fetches once it leaves
//! `Running`.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of a measurement run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// No new fetches are scheduled; queued snapshots are still processed
    Stopping,
    Stopped,
}

impl RunState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Running)
                | (RunState::Idle, RunState::Stopped)
                | (RunState::Running, RunState::Stopping)
                | (RunState::Stopping, RunState::Stopped)
        )
    }
}

/// Shared handle driving the run state
///
/// Cloning is cheap; every clone drives the same run.
#[derive(Debug, Clone)]
pub struct RunController {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn state(&self) -> RunState {
        *self.tx.borrow()
    }

    /// Receiver for observing state changes
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// `Idle → Running`; false if the run was already started or stopped
    pub fn start(&self) -> bool {
        self.transition(RunState::Running)
    }

    /// Request a stop
    ///
    /// A running run moves to `Stopping` and drains; a run that never started
    /// goes straight to `Stopped`. Returns false if there was nothing to stop.
    pub fn stop(&self) -> bool {
        match self.state() {
            RunState::Idle => self.transition(RunState::Stopped),
            _ => self.transition(RunState::Stopping),
        }
    }

    /// `Stopping → Stopped`, once the consumer has drained the queue
    pub(crate) fn finish(&self) -> bool {
        self.transition(RunState::Stopped)
    }

    fn transition(&self, next: RunState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!("Run state -> {:?}", next);
        }
        changed
    }
}
