//! Recorded canvas events.
//!
//! Responsibilities:
//! - name every operation a recorder can put into its stream
//! - separate control events (bookkeeping that never occupies a checkpoint
//!   position) from canvas events
//! - encode/decode event payloads for the transport (`codec`)

mod codec;

pub(crate) use codec::{decode, encode};

use crate::coords::{IntRect, IntSize, SurfaceFormat};
use crate::ids::{ReferencePtr, TextureId};
use crate::paint::Color;
use crate::transport::BufferId;

/// Drawing operation applied to one draw target.
///
/// Deliberately tiny: rasterization semantics live with the translator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    /// Source-over fill of `rect` with a premultiplied color.
    FillRect { rect: IntRect, color: Color },
    /// Resets `rect` to transparent.
    Clear { rect: IntRect },
}

/// One recorded operation.
///
/// Immutable once recorded; the translator applies events strictly in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BeginTransaction,
    EndTransaction,
    /// Asks the translator to pause until the producer installs a new readback buffer.
    PauseTranslation,
    /// Transport buffers the producer released; the reader may forget them.
    DropBuffers(Vec<BufferId>),

    CreateDrawTarget { target: ReferencePtr, size: IntSize, format: SurfaceFormat },
    DestroyDrawTarget { target: ReferencePtr },
    Draw { target: ReferencePtr, op: DrawOp },
    Flush,
    DeviceChangeAcknowledged,
    AddSurfaceAlias { alias: ReferencePtr, surface: ReferencePtr },
    RemoveSurfaceAlias { alias: ReferencePtr },
    PrepareDataForSurface { surface: ReferencePtr },
    GetDataForSurface { surface: ReferencePtr },
    /// Publishes the current contents of `target` as replay texture `texture_id`.
    PresentTexture { target: ReferencePtr, texture_id: TextureId },
    ReleaseTexture { texture_id: TextureId },
}

impl Event {
    /// Control events travel in order with everything else but do not
    /// occupy a checkpoint position.
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Event::BeginTransaction
                | Event::EndTransaction
                | Event::PauseTranslation
                | Event::DropBuffers(_)
        )
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::BeginTransaction => "BeginTransaction",
            Event::EndTransaction => "EndTransaction",
            Event::PauseTranslation => "PauseTranslation",
            Event::DropBuffers(_) => "DropBuffers",
            Event::CreateDrawTarget { .. } => "CreateDrawTarget",
            Event::DestroyDrawTarget { .. } => "DestroyDrawTarget",
            Event::Draw { .. } => "Draw",
            Event::Flush => "Flush",
            Event::DeviceChangeAcknowledged => "DeviceChangeAcknowledged",
            Event::AddSurfaceAlias { .. } => "AddSurfaceAlias",
            Event::RemoveSurfaceAlias { .. } => "RemoveSurfaceAlias",
            Event::PrepareDataForSurface { .. } => "PrepareDataForSurface",
            Event::GetDataForSurface { .. } => "GetDataForSurface",
            Event::PresentTexture { .. } => "PresentTexture",
            Event::ReleaseTexture { .. } => "ReleaseTexture",
        }
    }
}
