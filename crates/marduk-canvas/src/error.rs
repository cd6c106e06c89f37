use thiserror::Error;

use crate::ids::{ManagerId, ProtocolId};

/// Violations of the manager endpoint protocol.
///
/// These are never retried: the endpoint that observed one closes itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid id")]
    InvalidId,
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("endpoint used before initialization")]
    NotInitialized,
    #[error("endpoint is not bound")]
    NotBound,
    #[error("endpoint is closed")]
    Closed,
    #[error("invalid actor {protocol_id} for manager {manager_id}")]
    InvalidActor { manager_id: ManagerId, protocol_id: ProtocolId },
    #[error("unsupported actor")]
    UnsupportedActor,
    #[error("unsupported protocol")]
    UnsupportedProtocol,
    #[error("invalid OwnerId")]
    InvalidOwnerId,
    #[error("remote canvas is not available")]
    RemoteCanvasDisabled,
    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("translator unavailable: {0}")]
    Transport(#[from] TransportError),
}

/// Failures of the shared-memory transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to allocate {size} bytes of shared memory")]
    AllocationFailed { size: usize },
    #[error("translator rejected {0}")]
    Rejected(&'static str),
    #[error("transport is closed")]
    Closed,
    #[error("frame of {0} bytes does not fit any buffer")]
    FrameTooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("failed to spawn translator thread: {0}")]
    Spawn(String),
}

/// Failures reported by a snapshot backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("no front buffer available")]
    NoFrontBuffer,
    #[error("backend lost: {0}")]
    BackendLost(String),
}
