//! Read-only filtering stage.
//!
//! Sits in front of the request pipeline of a server running in read-only
//! mode. A dedicated consumer thread drains the inbound queue in arrival
//! order: state-changing requests are answered with
//! `ErrorCode::NotReadOnly` and dropped, everything else is handed to the
//! next processor unchanged.
//!
//! Shutdown is top-down. [`ReadOnlyRequestProcessor::shutdown`] refuses new
//! work, purges the queue and wakes the consumer, then returns. The consumer
//! thread, once its loop has exited, calls `shutdown` on the next processor
//! exactly once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rofilter_core::{
    CommittedVersionSource, OpCode, ProcessorError, Request, RequestProcessor,
};
use tracing::{debug, error, info, trace};

use super::config::ProcessorConfig;
use super::error::StageError;
use super::lifecycle::{StageLifecycle, StageState};
use super::queue::{QueueEntry, RequestQueue};
use super::reject::RejectionResponder;

pub const REQUESTS_FORWARDED: &str = "rofilter_requests_forwarded_total";
pub const REQUESTS_REJECTED: &str = "rofilter_requests_rejected_total";
pub const REPLY_FAILURES: &str = "rofilter_reply_failures_total";
pub const REQUESTS_PURGED: &str = "rofilter_requests_purged_total";
pub const REQUESTS_DROPPED: &str = "rofilter_requests_dropped_total";

/// Receives notice when a stage thread dies from an unexpected failure.
pub trait CriticalErrorListener: Send + Sync {
    fn notify_stopping(&self, thread_name: &str, error: &StageError);
}

/// State shared between the stage handle and its consumer thread.
struct Shared {
    name: String,
    queue: RequestQueue,
    lifecycle: StageLifecycle,
    responder: RejectionResponder,
    next: Arc<dyn RequestProcessor>,
    listener: Option<Arc<dyn CriticalErrorListener>>,
}

/// Consumer thread bookkeeping. `started` survives `join`.
#[derive(Default)]
struct Consumer {
    started: bool,
    handle: Option<JoinHandle<()>>,
}

/// Filtering stage that rejects state-changing requests while the server is
/// read-only and forwards the rest downstream in order.
pub struct ReadOnlyRequestProcessor {
    shared: Arc<Shared>,
    consumer: Mutex<Consumer>,
}

impl ReadOnlyRequestProcessor {
    /// Creates a stopped-until-started stage in front of `next`.
    ///
    /// `zks` supplies the committed version stamped on rejection replies.
    #[must_use]
    pub fn new(
        config: &ProcessorConfig,
        zks: Arc<dyn CommittedVersionSource>,
        next: Arc<dyn RequestProcessor>,
    ) -> Self {
        Self::build(config, zks, next, None)
    }

    /// Like [`ReadOnlyRequestProcessor::new`], reporting fatal loop failures
    /// to `listener`.
    #[must_use]
    pub fn with_listener(
        config: &ProcessorConfig,
        zks: Arc<dyn CommittedVersionSource>,
        next: Arc<dyn RequestProcessor>,
        listener: Arc<dyn CriticalErrorListener>,
    ) -> Self {
        Self::build(config, zks, next, Some(listener))
    }

    fn build(
        config: &ProcessorConfig,
        zks: Arc<dyn CommittedVersionSource>,
        next: Arc<dyn RequestProcessor>,
        listener: Option<Arc<dyn CriticalErrorListener>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: config.thread_name(),
                queue: RequestQueue::new(),
                lifecycle: StageLifecycle::new(),
                responder: RejectionResponder::new(zks),
                next,
                listener,
            }),
            consumer: Mutex::new(Consumer::default()),
        }
    }

    /// Spawns the consumer thread.
    ///
    /// # Errors
    ///
    /// Returns `StageError::AlreadyStarted` on a second call,
    /// `StageError::ShutDown` once `shutdown` has been requested, and
    /// `StageError::Spawn` if the OS refuses to create the thread.
    pub fn start(&self) -> Result<(), StageError> {
        let mut consumer = self.consumer.lock();
        if consumer.started {
            return Err(StageError::AlreadyStarted);
        }
        // Checked under the consumer lock; `shutdown` takes the same lock
        // after setting `finished`.
        if self.shared.lifecycle.is_finished() {
            return Err(StageError::ShutDown);
        }
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.run())?;
        consumer.started = true;
        consumer.handle = Some(spawned);
        Ok(())
    }

    /// Enqueues `request`, or drops it if the stage has finished.
    pub fn submit(&self, request: Request) {
        if self.shared.lifecycle.is_finished() {
            Shared::drop_late(&request);
            return;
        }
        if let Err(request) = self.shared.queue.push(request) {
            Shared::drop_late(&request);
        }
    }

    /// Stops accepting work, discards queued requests and wakes the
    /// consumer. Does not wait for the consumer to exit.
    ///
    /// If the stage was never started there is no consumer, so the next
    /// processor is shut down here instead. Only the first call has any
    /// effect.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        if !shared.lifecycle.mark_finished() {
            debug!(stage = %shared.name, "shutdown already requested");
            return;
        }
        info!(stage = %shared.name, "shutting down");
        let purged = shared.queue.terminate();
        if purged > 0 {
            debug!(stage = %shared.name, purged, "discarded queued requests");
            metrics::counter!(REQUESTS_PURGED).increment(purged as u64);
        }

        let started = self.consumer.lock().started;
        if !started {
            shared.exit();
        }
    }

    /// Blocks until the consumer thread has exited.
    ///
    /// Returns immediately if the stage was never started or was already
    /// joined.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Panicked` if the consumer thread panicked outside
    /// request dispatch.
    pub fn join(&self) -> Result<(), StageError> {
        let handle = self.consumer.lock().handle.take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|payload| StageError::Panicked(panic_message(payload.as_ref()))),
            None => Ok(()),
        }
    }

    /// Waits until the stage has exited and shut down its downstream, up to
    /// `timeout`. Returns `false` on timeout.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        self.shared.lifecycle.wait_for_exit(timeout).await
    }

    /// Current consumer loop state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.shared.lifecycle.state()
    }

    /// Whether the stage refuses new work.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.lifecycle.is_finished()
    }

    /// Consumer thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of requests waiting to be classified.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }
}

impl RequestProcessor for ReadOnlyRequestProcessor {
    fn process_request(&self, request: Request) -> Result<(), ProcessorError> {
        self.submit(request);
        Ok(())
    }

    fn shutdown(&self) {
        ReadOnlyRequestProcessor::shutdown(self);
    }
}

impl Shared {
    /// Consumer thread body.
    fn run(&self) {
        if let Err(err) = self.filter_loop() {
            self.handle_failure(&err);
        }
        self.exit();
    }

    /// Moves to `Stopped` and shuts down the next processor. Runs once per
    /// stage: on the consumer thread, or from `shutdown` if no consumer was
    /// ever spawned.
    fn exit(&self) {
        self.lifecycle.begin_stopping();
        self.lifecycle.mark_finished();
        let leftover = self.queue.close();
        if leftover > 0 {
            metrics::counter!(REQUESTS_PURGED).increment(leftover as u64);
        }
        self.lifecycle.mark_stopped();
        info!(stage = %self.name, "ReadOnlyRequestProcessor exited loop!");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.next.shutdown())) {
            error!(
                stage = %self.name,
                panic = %panic_message(payload.as_ref()),
                "downstream shutdown panicked"
            );
        }
        self.lifecycle.notify_exited();
    }

    fn filter_loop(&self) -> Result<(), StageError> {
        while !self.lifecycle.is_finished() {
            let request = match self.queue.take() {
                QueueEntry::RequestOfDeath => {
                    self.lifecycle.begin_stopping();
                    break;
                }
                QueueEntry::Request(request) => request,
            };
            trace_request(&request);

            if self.lifecycle.is_finished() {
                // Dequeued concurrently with shutdown: treat as purged.
                metrics::counter!(REQUESTS_PURGED).increment(1);
                self.lifecycle.begin_stopping();
                break;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request))) {
                Ok(result) => result?,
                Err(payload) => return Err(StageError::Panicked(panic_message(payload.as_ref()))),
            }
        }
        Ok(())
    }

    /// Rejects or forwards one request.
    fn dispatch(&self, request: Request) -> Result<(), StageError> {
        if request.op.is_mutating() {
            match self.responder.reject(&request) {
                Ok(header) => {
                    debug!(
                        cxid = request.cxid,
                        op = %request.op,
                        zxid = %header.zxid,
                        "rejected state-changing request in read-only mode"
                    );
                    metrics::counter!(REQUESTS_REJECTED).increment(1);
                }
                Err(err) => {
                    error!(
                        session_id = request.session_id,
                        cxid = request.cxid,
                        op = %request.op,
                        error = %err,
                        "IO exception while sending response"
                    );
                    metrics::counter!(REPLY_FAILURES).increment(1);
                }
            }
            return Ok(());
        }

        self.next.process_request(request)?;
        metrics::counter!(REQUESTS_FORWARDED).increment(1);
        Ok(())
    }

    fn handle_failure(&self, err: &StageError) {
        if let StageError::Downstream(cause @ ProcessorError::XidRollover) = err {
            info!(stage = %self.name, "{cause}");
        }
        error!(stage = %self.name, error = %err, "severe unrecoverable error, exiting stage loop");
        if let Some(listener) = &self.listener {
            listener.notify_stopping(&self.name, err);
        }
    }

    fn drop_late(request: &Request) {
        trace!(cxid = request.cxid, op = %request.op, "stage finished, dropping request");
        metrics::counter!(REQUESTS_DROPPED).increment(1);
    }
}

fn trace_request(request: &Request) {
    if request.op == OpCode::Ping {
        trace!(
            target: "rofilter::trace::ping",
            session_id = request.session_id,
            cxid = request.cxid,
            "R ping"
        );
    } else {
        trace!(
            target: "rofilter::trace::request",
            session_id = request.session_id,
            cxid = request.cxid,
            op = %request.op,
            "R request"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
