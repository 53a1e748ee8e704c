//! Operation catalogue: the closed set of request kinds a client may send.
//!
//! Numeric codes match the coordination service wire protocol. Classification
//! into mutating and read-only kinds lives next to the catalogue so the two
//! cannot drift apart: [`OpCode::is_mutating`] matches every variant
//! explicitly, and a new variant without a classification fails to compile.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a numeric op code is not part of the catalogue.
///
/// Raised by the connection layer while decoding, before a request ever
/// reaches a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown op code: {0}")]
pub struct UnknownOpCode(pub i32);

/// Kind of operation a client request asks the service to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum OpCode {
    Notification,
    Create,
    Delete,
    Exists,
    GetData,
    SetData,
    GetAcl,
    SetAcl,
    GetChildren,
    Sync,
    Ping,
    GetChildren2,
    Check,
    Multi,
    Create2,
    Reconfig,
    CheckWatches,
    RemoveWatches,
    CreateContainer,
    DeleteContainer,
    CreateTtl,
    MultiRead,
    Auth,
    SetWatches,
    Sasl,
    GetEphemerals,
    GetAllChildrenNumber,
    SetWatches2,
    AddWatch,
    WhoAmI,
    CreateSession,
    CloseSession,
    Error,
}

impl OpCode {
    /// Every catalogue entry, in wire-code order of declaration.
    pub const ALL: [OpCode; 33] = [
        OpCode::Notification,
        OpCode::Create,
        OpCode::Delete,
        OpCode::Exists,
        OpCode::GetData,
        OpCode::SetData,
        OpCode::GetAcl,
        OpCode::SetAcl,
        OpCode::GetChildren,
        OpCode::Sync,
        OpCode::Ping,
        OpCode::GetChildren2,
        OpCode::Check,
        OpCode::Multi,
        OpCode::Create2,
        OpCode::Reconfig,
        OpCode::CheckWatches,
        OpCode::RemoveWatches,
        OpCode::CreateContainer,
        OpCode::DeleteContainer,
        OpCode::CreateTtl,
        OpCode::MultiRead,
        OpCode::Auth,
        OpCode::SetWatches,
        OpCode::Sasl,
        OpCode::GetEphemerals,
        OpCode::GetAllChildrenNumber,
        OpCode::SetWatches2,
        OpCode::AddWatch,
        OpCode::WhoAmI,
        OpCode::CreateSession,
        OpCode::CloseSession,
        OpCode::Error,
    ];

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            OpCode::Notification => 0,
            OpCode::Create => 1,
            OpCode::Delete => 2,
            OpCode::Exists => 3,
            OpCode::GetData => 4,
            OpCode::SetData => 5,
            OpCode::GetAcl => 6,
            OpCode::SetAcl => 7,
            OpCode::GetChildren => 8,
            OpCode::Sync => 9,
            OpCode::Ping => 11,
            OpCode::GetChildren2 => 12,
            OpCode::Check => 13,
            OpCode::Multi => 14,
            OpCode::Create2 => 15,
            OpCode::Reconfig => 16,
            OpCode::CheckWatches => 17,
            OpCode::RemoveWatches => 18,
            OpCode::CreateContainer => 19,
            OpCode::DeleteContainer => 20,
            OpCode::CreateTtl => 21,
            OpCode::MultiRead => 22,
            OpCode::Auth => 100,
            OpCode::SetWatches => 101,
            OpCode::Sasl => 102,
            OpCode::GetEphemerals => 103,
            OpCode::GetAllChildrenNumber => 104,
            OpCode::SetWatches2 => 105,
            OpCode::AddWatch => 106,
            OpCode::WhoAmI => 107,
            OpCode::CreateSession => -10,
            OpCode::CloseSession => -11,
            OpCode::Error => -1,
        }
    }

    /// Catalogue name, as used in request trace output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Notification => "notification",
            OpCode::Create => "create",
            OpCode::Delete => "delete",
            OpCode::Exists => "exists",
            OpCode::GetData => "getData",
            OpCode::SetData => "setData",
            OpCode::GetAcl => "getACL",
            OpCode::SetAcl => "setACL",
            OpCode::GetChildren => "getChildren",
            OpCode::Sync => "sync",
            OpCode::Ping => "ping",
            OpCode::GetChildren2 => "getChildren2",
            OpCode::Check => "check",
            OpCode::Multi => "multi",
            OpCode::Create2 => "create2",
            OpCode::Reconfig => "reconfig",
            OpCode::CheckWatches => "checkWatches",
            OpCode::RemoveWatches => "removeWatches",
            OpCode::CreateContainer => "createContainer",
            OpCode::DeleteContainer => "deleteContainer",
            OpCode::CreateTtl => "createTTL",
            OpCode::MultiRead => "multiRead",
            OpCode::Auth => "auth",
            OpCode::SetWatches => "setWatches",
            OpCode::Sasl => "sasl",
            OpCode::GetEphemerals => "getEphemerals",
            OpCode::GetAllChildrenNumber => "getAllChildrenNumber",
            OpCode::SetWatches2 => "setWatches2",
            OpCode::AddWatch => "addWatch",
            OpCode::WhoAmI => "whoAmI",
            OpCode::CreateSession => "createSession",
            OpCode::CloseSession => "closeSession",
            OpCode::Error => "error",
        }
    }

    /// Whether executing this operation would change durable state or the
    /// ordering guarantees of the replicated store.
    ///
    /// Session open/close and watch bookkeeping are local to the serving
    /// node and are not replicated, so a read-only node still handles them.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        match self {
            OpCode::Create
            | OpCode::Create2
            | OpCode::CreateTtl
            | OpCode::CreateContainer
            | OpCode::Delete
            | OpCode::DeleteContainer
            | OpCode::SetData
            | OpCode::SetAcl
            | OpCode::Reconfig
            | OpCode::Sync
            | OpCode::Multi
            | OpCode::Check => true,

            OpCode::Notification
            | OpCode::Exists
            | OpCode::GetData
            | OpCode::GetAcl
            | OpCode::GetChildren
            | OpCode::Ping
            | OpCode::GetChildren2
            | OpCode::CheckWatches
            | OpCode::RemoveWatches
            | OpCode::MultiRead
            | OpCode::Auth
            | OpCode::SetWatches
            | OpCode::Sasl
            | OpCode::GetEphemerals
            | OpCode::GetAllChildrenNumber
            | OpCode::SetWatches2
            | OpCode::AddWatch
            | OpCode::WhoAmI
            | OpCode::CreateSession
            | OpCode::CloseSession
            | OpCode::Error => false,
        }
    }
}

impl TryFrom<i32> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(code: i32) -> Result<Self, UnknownOpCode> {
        OpCode::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or(UnknownOpCode(code))
    }
}

impl From<OpCode> for i32 {
    fn from(op: OpCode) -> Self {
        op.code()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn create_and_sync_are_mutating() {
        assert!(OpCode::Create.is_mutating());
        assert!(OpCode::Sync.is_mutating());
    }

    #[test]
    fn ping_and_reads_are_read_only() {
        assert!(!OpCode::Ping.is_mutating());
        assert!(!OpCode::GetData.is_mutating());
        assert!(!OpCode::Exists.is_mutating());
        assert!(!OpCode::GetChildren2.is_mutating());
    }

    #[test]
    fn mutating_set_matches_catalogue() {
        let mutating: HashSet<OpCode> =
            OpCode::ALL.iter().copied().filter(|op| op.is_mutating()).collect();
        let expected: HashSet<OpCode> = [
            OpCode::Sync,
            OpCode::Create,
            OpCode::Create2,
            OpCode::CreateTtl,
            OpCode::CreateContainer,
            OpCode::Delete,
            OpCode::DeleteContainer,
            OpCode::SetData,
            OpCode::Reconfig,
            OpCode::SetAcl,
            OpCode::Multi,
            OpCode::Check,
        ]
        .into_iter()
        .collect();
        assert_eq!(mutating, expected);
    }

    #[test]
    fn wire_codes_are_unique() {
        let codes: HashSet<i32> = OpCode::ALL.iter().map(|op| op.code()).collect();
        assert_eq!(codes.len(), OpCode::ALL.len());
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(OpCode::try_from(10), Err(UnknownOpCode(10)));
        assert_eq!(OpCode::try_from(-2), Err(UnknownOpCode(-2)));
    }

    #[test]
    fn display_uses_catalogue_name() {
        assert_eq!(OpCode::SetAcl.to_string(), "setACL");
        assert_eq!(OpCode::CreateTtl.to_string(), "createTTL");
    }

    #[test]
    fn serializes_as_wire_code() {
        let bytes = rmp_serde::to_vec(&OpCode::SetData).unwrap();
        let code: i32 = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(code, 5);
    }

    proptest! {
        #[test]
        fn decoding_is_total_over_i32(code in any::<i32>()) {
            match OpCode::try_from(code) {
                Ok(op) => prop_assert_eq!(op.code(), code),
                Err(UnknownOpCode(c)) => {
                    prop_assert_eq!(c, code);
                    prop_assert!(OpCode::ALL.iter().all(|op| op.code() != code));
                }
            }
        }
    }
}
