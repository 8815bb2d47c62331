//! The non-interruptible part of a work cycle.
//!
//! Between requesting a chunk and reporting its outcome a worker must not
//! stop, or the chunk is lost for good. [`CriticalSection`] tracks whether
//! that window is open and whether shutdown has been requested, and lets the
//! shutdown path wait for the window to close.
//!
//! Both flags live in one [`watch`] channel so that "enter unless shutting
//! down" and "request shutdown" are each a single atomic update, and waiters
//! are woken by change notifications instead of polling.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SectionState {
    active: bool,
    shutdown_requested: bool,
}

/// Shared handle to a worker's critical section.
#[derive(Debug, Clone)]
pub struct CriticalSection {
    state: Arc<watch::Sender<SectionState>>,
}

/// Keeps the critical section open until dropped.
#[derive(Debug)]
#[must_use = "the critical section closes as soon as the guard is dropped"]
pub struct CriticalGuard {
    state: Arc<watch::Sender<SectionState>>,
}

impl CriticalSection {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SectionState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Opens the section.
    ///
    /// Returns `None` once shutdown has been requested (or if the section is
    /// already open), in which case no new work may be started.
    pub fn try_enter(&self) -> Option<CriticalGuard> {
        let mut entered = false;
        self.state.send_if_modified(|state| {
            if state.shutdown_requested || state.active {
                return false;
            }
            state.active = true;
            entered = true;
            true
        });

        entered.then(|| CriticalGuard {
            state: Arc::clone(&self.state),
        })
    }

    /// Asks the worker to stop before its next cycle. Idempotent.
    pub fn request_shutdown(&self) {
        self.state.send_if_modified(|state| {
            let changed = !state.shutdown_requested;
            state.shutdown_requested = true;
            changed
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state.borrow().shutdown_requested
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Resolves once the section is closed.
    pub async fn drained(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|state| !state.active).await;
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.active = false);
    }
}
