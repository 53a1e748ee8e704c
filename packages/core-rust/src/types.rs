//! Wire-level value types shared by every pipeline stage.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::traits::CommittedVersionSource;

/// Committed-version token: the id of the last transaction the data tree has
/// applied. Opaque to pipeline stages; only ever copied into replies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Zxid(pub i64);

impl Zxid {
    /// Epoch component (high 32 bits).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn epoch(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Counter component (low 32 bits).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn counter(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Zxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Lock-free holder of the data tree's last processed [`Zxid`].
///
/// The value only moves forward: [`LastProcessedZxid::advance`] ignores
/// tokens older than the current one.
#[derive(Debug, Default)]
pub struct LastProcessedZxid {
    value: AtomicI64,
}

impl LastProcessedZxid {
    /// Creates a holder starting at `initial`.
    #[must_use]
    pub fn new(initial: Zxid) -> Self {
        Self {
            value: AtomicI64::new(initial.0),
        }
    }

    /// Moves the token forward to `zxid`. Returns `false` if `zxid` is not
    /// newer than the current value, in which case nothing changes.
    pub fn advance(&self, zxid: Zxid) -> bool {
        let previous = self.value.fetch_max(zxid.0, Ordering::AcqRel);
        if previous >= zxid.0 {
            if previous > zxid.0 {
                tracing::warn!(
                    current = %Zxid(previous),
                    offered = %zxid,
                    "ignoring attempt to move last processed zxid backwards"
                );
            }
            return false;
        }
        true
    }

    /// Current token.
    #[must_use]
    pub fn get(&self) -> Zxid {
        Zxid(self.value.load(Ordering::Acquire))
    }
}

impl CommittedVersionSource for LastProcessedZxid {
    fn last_processed_zxid(&self) -> Zxid {
        self.get()
    }
}

/// Error returned when a numeric status code is not a known [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub i32);

/// Reply status codes.
///
/// Values match the service's numeric error codes so replies can be decoded
/// by existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    Ok,
    SystemError,
    ConnectionLoss,
    MarshallingError,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    SessionExpired,
    /// A state-changing request reached a server running in read-only mode.
    NotReadOnly,
}

impl ErrorCode {
    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::SystemError => -1,
            ErrorCode::ConnectionLoss => -4,
            ErrorCode::MarshallingError => -5,
            ErrorCode::Unimplemented => -6,
            ErrorCode::OperationTimeout => -7,
            ErrorCode::BadArguments => -8,
            ErrorCode::SessionExpired => -112,
            ErrorCode::NotReadOnly => -119,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(code: i32) -> Result<Self, UnknownErrorCode> {
        match code {
            0 => Ok(ErrorCode::Ok),
            -1 => Ok(ErrorCode::SystemError),
            -4 => Ok(ErrorCode::ConnectionLoss),
            -5 => Ok(ErrorCode::MarshallingError),
            -6 => Ok(ErrorCode::Unimplemented),
            -7 => Ok(ErrorCode::OperationTimeout),
            -8 => Ok(ErrorCode::BadArguments),
            -112 => Ok(ErrorCode::SessionExpired),
            -119 => Ok(ErrorCode::NotReadOnly),
            other => Err(UnknownErrorCode(other)),
        }
    }
}

/// Correlation envelope attached to every outbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyHeader {
    /// Client correlation id, copied from the originating request.
    pub xid: i32,
    /// Last committed version at the time the reply was built.
    pub zxid: Zxid,
    /// Outcome of the request.
    pub err: ErrorCode,
}

impl ReplyHeader {
    #[must_use]
    pub fn new(xid: i32, zxid: Zxid, err: ErrorCode) -> Self {
        Self { xid, zxid, err }
    }
}

/// A framed reply: header plus optional opaque body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub header: ReplyHeader,
    #[serde(with = "serde_bytes")]
    pub body: Option<Vec<u8>>,
}

impl ReplyFrame {
    /// Encodes the frame as MessagePack.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(
        header: ReplyHeader,
        body: Option<&[u8]>,
    ) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        let frame = ReplyFrame {
            header,
            body: body.map(<[u8]>::to_vec),
        };
        rmp_serde::to_vec_named(&frame)
    }

    /// Decodes a MessagePack frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
