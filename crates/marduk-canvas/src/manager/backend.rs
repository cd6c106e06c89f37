use crate::coords::IntSize;
use crate::error::SnapshotError;
use crate::ids::RemoteTextureOwnerId;

/// Which end of a connection an actor lives on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Side {
    /// The rendering end. Only these actors can serve snapshots.
    #[default]
    Parent,
    Child,
}

/// Protocol a managed actor speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActorKind {
    Canvas,
    WebGl,
    WebGpu,
}

/// Pixels of a backend's current front buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontBufferSnapshot {
    pub size: IntSize,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

/// A 3D or compute backend that can snapshot its front buffer.
pub trait SnapshotBackend: Send + Sync {
    fn side(&self) -> Side {
        Side::Parent
    }

    /// `owner` identifies the remote texture for backends that keep several.
    fn front_buffer_snapshot(
        &self,
        owner: Option<RemoteTextureOwnerId>,
    ) -> Result<FrontBufferSnapshot, SnapshotError>;
}

/// Told when remote canvas is switched off for the process.
pub trait RemoteCanvasListener: Send + Sync {
    fn remote_canvas_disabled(&self);
}
