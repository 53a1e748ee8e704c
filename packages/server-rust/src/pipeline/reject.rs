//! Builds and delivers the "server is read-only" reply for rejected requests.

use std::sync::Arc;

use rofilter_core::{CommittedVersionSource, ErrorCode, ReplyError, ReplyHeader, Request};

/// Replies to state-changing requests with `ErrorCode::NotReadOnly`.
///
/// The committed version is read from the data store at rejection time so
/// the client sees how far the server had progressed when it refused.
#[derive(Clone)]
pub struct RejectionResponder {
    zks: Arc<dyn CommittedVersionSource>,
}

impl RejectionResponder {
    #[must_use]
    pub fn new(zks: Arc<dyn CommittedVersionSource>) -> Self {
        Self { zks }
    }

    /// Reply header for rejecting `request`.
    #[must_use]
    pub fn rejection_header(&self, request: &Request) -> ReplyHeader {
        ReplyHeader::new(
            request.cxid,
            self.zks.last_processed_zxid(),
            ErrorCode::NotReadOnly,
        )
    }

    /// Sends the rejection to the request's connection, with no body.
    ///
    /// # Errors
    ///
    /// Returns `ReplyError` if the connection cannot take the reply.
    pub fn reject(&self, request: &Request) -> Result<ReplyHeader, ReplyError> {
        let header = self.rejection_header(request);
        request.cnxn.send_response(&header, None)?;
        Ok(header)
    }
}
