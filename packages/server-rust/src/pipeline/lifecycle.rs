//! Stage lifecycle: the `finished` flag, the observable loop state, and the
//! exit notification.
//!
//! Uses an `AtomicBool` for the producer fast path, `ArcSwap` for lock-free
//! state reads, and a `watch` channel so owners can await loop exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Consumer loop state.
///
/// State machine: Running -> Stopping -> Stopped. A fatal failure may go
/// straight from Running to Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Dequeuing and dispatching requests.
    Running,
    /// Termination observed; the loop is on its way out.
    Stopping,
    /// The loop has exited. Terminal.
    Stopped,
}

/// Shared lifecycle state for one filtering stage.
#[derive(Debug)]
pub struct StageLifecycle {
    finished: AtomicBool,
    state: ArcSwap<StageState>,
    exit_signal: watch::Sender<bool>,
}

impl StageLifecycle {
    /// Creates a lifecycle in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            finished: AtomicBool::new(false),
            state: ArcSwap::from_pointee(StageState::Running),
            exit_signal: tx,
        }
    }

    /// Sets the `finished` flag. Returns `true` only for the call that set it.
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    /// Whether new work must be refused.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Running -> Stopping. No effect once stopped.
    pub fn begin_stopping(&self) {
        self.state.rcu(|current| match **current {
            StageState::Running => Arc::new(StageState::Stopping),
            other => Arc::new(other),
        });
    }

    /// Records that the loop has exited.
    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(StageState::Stopped));
    }

    /// Signals everyone waiting in [`StageLifecycle::wait_for_exit`].
    pub fn notify_exited(&self) {
        // send_replace: there may be no receivers yet
        self.exit_signal.send_replace(true);
    }

    /// Returns the current loop state.
    #[must_use]
    pub fn state(&self) -> StageState {
        **self.state.load()
    }

    /// Returns a receiver that flips to `true` once the stage has exited and
    /// handed shutdown downstream.
    #[must_use]
    pub fn exit_receiver(&self) -> watch::Receiver<bool> {
        self.exit_signal.subscribe()
    }

    /// Waits until the stage has fully exited, up to `timeout`.
    ///
    /// Returns `false` if the timeout expired first.
    #[allow(clippy::let_and_return)]
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let mut rx = self.exit_receiver();
        // Bound to a local so the borrowed `watch::Ref` drops before `rx`.
        let exited = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|exited| *exited)).await,
            Ok(Ok(_))
        );
        exited
    }
}

impl Default for StageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_running() {
        let lifecycle = StageLifecycle::new();
        assert_eq!(lifecycle.state(), StageState::Running);
        assert!(!lifecycle.is_finished());
    }

    #[test]
    fn mark_finished_reports_first_caller_only() {
        let lifecycle = StageLifecycle::new();
        assert!(lifecycle.mark_finished());
        assert!(!lifecycle.mark_finished());
        assert!(lifecycle.is_finished());
    }

    #[test]
    fn state_transitions_running_stopping_stopped() {
        let lifecycle = StageLifecycle::new();
        lifecycle.begin_stopping();
        assert_eq!(lifecycle.state(), StageState::Stopping);
        lifecycle.mark_stopped();
        assert_eq!(lifecycle.state(), StageState::Stopped);
    }

    #[test]
    fn stopped_is_terminal() {
        let lifecycle = StageLifecycle::new();
        lifecycle.mark_stopped();
        lifecycle.begin_stopping();
        assert_eq!(lifecycle.state(), StageState::Stopped);
    }

    #[tokio::test]
    async fn exit_receiver_notified() {
        let lifecycle = StageLifecycle::new();
        let mut rx = lifecycle.exit_receiver();
        assert!(!*rx.borrow());

        lifecycle.notify_exited();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn wait_for_exit_after_notification() {
        let lifecycle = StageLifecycle::new();
        lifecycle.notify_exited();
        assert!(lifecycle.wait_for_exit(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn wait_for_exit_timeout() {
        let lifecycle = StageLifecycle::new();
        assert!(!lifecycle.wait_for_exit(Duration::from_millis(20)).await);
    }
}
