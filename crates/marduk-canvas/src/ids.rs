//! Identifiers shared between producers, translators and the manager.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of a producing process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content:{}", self.0)
    }
}

/// Non-zero id a producer assigns to its manager endpoint.
pub type ManagerId = u32;

/// Producer-chosen id of a replay texture.
pub type TextureId = i64;

/// Id of a sub-endpoint (managed actor) within one manager endpoint.
pub type ProtocolId = i32;

/// Owner token for remote textures produced by the WebGPU backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTextureOwnerId(pub u64);

/// Names a recorded object (draw target or surface) inside one event stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferencePtr(pub u64);

impl ReferencePtr {
    /// Allocates a process-unique reference.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ReferencePtr(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
