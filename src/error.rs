//! Error types and resp/resp2 status-code mapping.
//!
//! Every embedded command finishes with a `(resp, resp2)` pair (§7 of the
//! design). [`Error`] is the Rust-level failure type raised internally by the
//! monitor's subsystems; [`Resp`] is the pair actually handed back across the
//! command interpreter/abend boundary. The two are related but distinct:
//! a subsystem failure becomes a `Resp` via [`Error::resp`], and from there
//! either populates a bound RESP field or drives [`crate::abend`].

use crate::field::Type;
use std::fmt;

/// A resp/resp2 status pair, as returned to the artifact after every
/// embedded command (§3 "Resp Binding", §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Resp {
    pub resp: i32,
    pub resp2: i32,
}

impl Resp {
    pub const OK: Resp = Resp { resp: 0, resp2: 0 };

    pub const fn new(resp: i32, resp2: i32) -> Self {
        Resp { resp, resp2 }
    }

    pub fn is_ok(&self) -> bool {
        self.resp == 0
    }
}

impl fmt::Display for Resp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESP={} RESP2={}", self.resp, self.resp2)
    }
}

/// Failures raised by the monitor's subsystems.
///
/// Kinds follow §7: transient conditions the artifact can retry, permanent
/// conditions that indicate a misconfigured or missing artifact, fatal
/// conditions that force task teardown, and client-protocol failures (the
/// client channel closing mid-dialogue).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource already held by another task and `NOSUSPEND` was requested (§4.3).
    #[error("resource enqueue would block (nosuspend)")]
    EnqueueWouldBlock,

    /// Artifact file not found, or its entry symbol is missing (§4.4).
    #[error("program artifact `{0}` not found or missing its entry symbol")]
    ArtifactNotFound(String),

    /// A requested length/area size is invalid for the operation (§4.6: GETMAIN, LINK commarea).
    #[error("invalid length or area size: {0}")]
    InvalidLength(&'static str),

    /// `FREEMAIN` of a pointer unknown to either pool (§4.2).
    #[error("freemain of unknown pointer")]
    UnknownPointer,

    /// A value could not be converted to/from the requested [`Type`].
    #[error("cannot convert value to/from type {0:?}")]
    Conversion(Type),

    /// A fetched row did not contain the requested column.
    #[error("column index out of range in fetched row")]
    InvalidColumn,

    /// `SYNCPOINT`'s client sub-dialogue rolled back without the artifact
    /// having requested a rollback (§4.6 SYNCPOINT, §7).
    #[error("rollback requested during syncpoint with no user rollback option")]
    RollbackInSyncpoint,

    /// The underlying database driver reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// The client channel returned EOF or an I/O error mid-dialogue.
    #[error("client channel I/O error: {0}")]
    Client(#[from] std::io::Error),

    /// A fixed-capacity table (call stack, link stack, channel buffers, …)
    /// was exceeded where the design calls for a surfaced resp rather than
    /// silent truncation (§9 open question on module-registry overflow is
    /// the one documented exception — see [`crate::serializer`]).
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// The task unwound via an unhandled abend (§4.7). Terminal: the
    /// caller ends the task rather than resuming the artifact.
    #[error("task abended with code {0}")]
    TaskAbended(String),

    /// `GET CHANNEL` named a container with no matching `PUT` in this
    /// task's channel buffer list (§3 "Channel Buffer List", §4.6
    /// "PUT / GET"). Not named by §7's error table; mapped to the same
    /// resp/resp2 pair the original reports for an unresolved container
    /// (`NOTFND`/resp 36).
    #[error("channel container `{0}` not found")]
    ChannelBufferNotFound(String),
}

impl Error {
    /// Maps a subsystem failure to the resp/resp2 pair the command
    /// interpreter reports to the artifact (§4.6, §7).
    pub fn resp(&self) -> Resp {
        match self {
            Error::EnqueueWouldBlock => Resp::new(55, 0),
            Error::ArtifactNotFound(_) => Resp::new(27, 3),
            Error::InvalidLength(_) => Resp::new(22, 11),
            Error::UnknownPointer => Resp::new(16, 1),
            Error::Conversion(_) => Resp::new(26, 1),
            Error::InvalidColumn => Resp::new(28, 1),
            Error::RollbackInSyncpoint => Resp::new(82, 0),
            Error::Database(_) => Resp::new(44, 1),
            Error::Client(_) => Resp::new(110, 0),
            Error::CapacityExceeded(_) => Resp::new(122, 0),
            Error::TaskAbended(_) => Resp::new(0, 0),
            Error::ChannelBufferNotFound(_) => Resp::new(36, 0),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_conflict_maps_to_resp_55() {
        assert_eq!(Error::EnqueueWouldBlock.resp(), Resp::new(55, 0));
    }

    #[test]
    fn artifact_not_found_maps_to_resp_27() {
        let err = Error::ArtifactNotFound("SUB1".into());
        assert_eq!(err.resp(), Resp::new(27, 3));
    }

    #[test]
    fn resp_ok_is_zero() {
        assert!(Resp::OK.is_ok());
        assert!(!Resp::new(16, 1).is_ok());
    }
}
