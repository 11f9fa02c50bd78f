//! Single-fire completion signal
//!
//! Fired by the wrapped block's `finally` path, or by the coordinator's
//! fallback timer when the block never gets there. The first `fire` wins;
//! later calls report `false` and change nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Who fired the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The wrapped block reached its `finally`
    Signaled,
    /// The fallback timer elapsed first
    Fallback,
}

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    inner: Arc<Inner>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        let first = self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
            // Covers a waiter that has not registered yet
            self.inner.notify.notify_one();
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Resolve once the signal has fired
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }

    /// Race the signal against a fallback timer of `grace`
    ///
    /// If the timer wins, the signal is fired on the block's behalf so
    /// nothing waits on it afterwards.
    pub async fn wait_or_fallback(&self, grace: Duration) -> Completion {
        tokio::select! {
            biased;
            _ = self.wait() => Completion::Signaled,
            _ = tokio::time::sleep(grace) => {
                if self.fire() {
                    Completion::Fallback
                } else {
                    Completion::Signaled
                }
            }
        }
    }
}
