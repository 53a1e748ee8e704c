//! The unit of work flowing through the pipeline.

use std::fmt;
use std::sync::Arc;

use crate::opcode::OpCode;
use crate::traits::ReplyChannel;

/// One client-originated operation in flight.
///
/// Created by the connection layer when a request is decoded; owned by
/// whichever pipeline stage currently holds it.
pub struct Request {
    /// Session the request belongs to.
    pub session_id: i64,
    /// Client correlation id, echoed unchanged in any reply.
    pub cxid: i32,
    /// What the client asked for.
    pub op: OpCode,
    /// Serialized request body, opaque to filtering stages.
    pub payload: Vec<u8>,
    /// Where replies to this request are delivered.
    pub cnxn: Arc<dyn ReplyChannel>,
}

impl Request {
    #[must_use]
    pub fn new(
        session_id: i64,
        cxid: i32,
        op: OpCode,
        payload: Vec<u8>,
        cnxn: Arc<dyn ReplyChannel>,
    ) -> Self {
        Self {
            session_id,
            cxid,
            op,
            payload,
            cnxn,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("session_id", &format_args!("0x{:x}", self.session_id))
            .field("cxid", &self.cxid)
            .field("op", &self.op)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}
