//! Seams between pipeline stages, the connection layer, and the data store.
//!
//! Every trait is `Send + Sync` so implementations can be shared as
//! `Arc<dyn ...>` across the stage thread and producer threads.

use std::io;

use crate::request::Request;
use crate::types::{ReplyHeader, Zxid};

/// Failure to deliver a reply to a client connection.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// The connection has been closed; the reply was dropped.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound buffer is full.
    #[error("outbound buffer full")]
    Full,
    /// The reply could not be framed.
    #[error("failed to encode reply: {0}")]
    Encode(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Capability owned by the connection layer for delivering a reply to the
/// client that sent a request.
///
/// Calling it after the connection closed must return an error, never panic.
pub trait ReplyChannel: Send + Sync {
    /// Send `header` and an optional serialized body back to the client.
    ///
    /// # Errors
    ///
    /// Returns `ReplyError` if the reply cannot be delivered.
    fn send_response(&self, header: &ReplyHeader, body: Option<&[u8]>) -> Result<(), ReplyError>;
}

/// Errors a request processor can report back to the stage feeding it.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The transaction id space of the current epoch is exhausted.
    #[error("zxid lower 32 bits have rolled over, forcing re-election")]
    XidRollover,
    /// The processor has already been shut down.
    #[error("processor is shut down")]
    ShutDown,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// One stage in the request-processing pipeline.
///
/// `process_request` must not wait for the request to be executed; it hands
/// ownership over and returns. `shutdown` is called exactly once by the
/// upstream stage, after the upstream stage has stopped calling
/// `process_request`.
pub trait RequestProcessor: Send + Sync {
    /// Take ownership of `request` for processing.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError` if the request cannot be accepted.
    fn process_request(&self, request: Request) -> Result<(), ProcessorError>;

    /// Stop processing and release resources.
    fn shutdown(&self);
}

/// Read access to the data store's progress marker.
///
/// Must be side-effect free and callable from any thread at any time,
/// including during shutdown.
pub trait CommittedVersionSource: Send + Sync {
    /// The id of the last transaction applied to the data tree.
    fn last_processed_zxid(&self) -> Zxid;
}
