//! `rofilter` Core — operation catalogue, reply headers, request model, and
//! the traits that connect pipeline stages to each other and to the
//! connection layer.

pub mod opcode;
pub mod request;
pub mod traits;
pub mod types;

pub use opcode::{OpCode, UnknownOpCode};
pub use request::Request;
pub use traits::{CommittedVersionSource, ProcessorError, ReplyChannel, ReplyError, RequestProcessor};
pub use types::{ErrorCode, LastProcessedZxid, ReplyFrame, ReplyHeader, UnknownErrorCode, Zxid};
