//! Async downstream stage.
//!
//! Provides `AsyncStage`, a `RequestProcessor` that hands requests to a tokio
//! task over an unbounded mpsc channel, so the upstream consumer thread never
//! waits on downstream execution.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use rofilter_core::{ProcessorError, Request, RequestProcessor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// StageRunnable trait
// ---------------------------------------------------------------------------

/// Handler executed by `AsyncStage` for each forwarded request.
#[async_trait]
pub trait StageRunnable: Send + 'static {
    /// Execute a single request.
    async fn run(&mut self, request: Request);

    /// Called once, after every request forwarded before shutdown has run.
    /// Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// AsyncStage
// ---------------------------------------------------------------------------

/// Downstream processor backed by a tokio task.
///
/// The task:
/// 1. Receives requests on an unbounded mpsc channel
/// 2. Calls `StageRunnable::run()` for each, in order
/// 3. Once the channel is closed and drained, calls `StageRunnable::shutdown()`
pub struct AsyncStage {
    tx: ArcSwapOption<mpsc::UnboundedSender<Request>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncStage {
    /// Spawn the stage task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<R: StageRunnable>(mut runnable: R) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                runnable.run(request).await;
            }
            runnable.shutdown().await;
        });

        Self {
            tx: ArcSwapOption::from_pointee(tx),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Whether the stage still accepts requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tx.load().is_some()
    }

    /// Wait for the stage task to finish. Resolves only after `shutdown`.
    pub async fn stopped(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "async stage task failed");
            }
        }
    }
}

impl RequestProcessor for AsyncStage {
    fn process_request(&self, request: Request) -> Result<(), ProcessorError> {
        match &*self.tx.load() {
            Some(tx) => tx.send(request).map_err(|_| ProcessorError::ShutDown),
            None => Err(ProcessorError::ShutDown),
        }
    }

    /// Closes the channel. Requests already accepted still run.
    fn shutdown(&self) {
        self.tx.store(None);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
