use std::sync::Arc;

use crate::coords::{IntRect, IntSize, SurfaceFormat};
use crate::event::{DrawOp, Event};
use crate::ids::{ReferencePtr, TextureId};
use crate::paint::Color;
use crate::transport::DrawEventRecorder;

use super::SourceSurface;

/// Drawing surface whose operations are recorded instead of rasterized.
///
/// Every call appends to the shared stream and returns whether it was
/// recorded. Dropping the target records its destruction.
pub struct DrawTarget {
    transport: Arc<DrawEventRecorder>,
    target: ReferencePtr,
    size: IntSize,
    format: SurfaceFormat,
}

impl DrawTarget {
    pub(crate) fn create(
        transport: Arc<DrawEventRecorder>,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Option<Self> {
        let target = ReferencePtr::next();
        if !transport.record_event(&Event::CreateDrawTarget { target, size, format }) {
            return None;
        }
        Some(Self { transport, target, size, format })
    }

    #[inline]
    pub fn reference(&self) -> ReferencePtr {
        self.target
    }

    #[inline]
    pub fn size(&self) -> IntSize {
        self.size
    }

    #[inline]
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    /// The target's current contents as a readable surface.
    pub fn surface(&self) -> SourceSurface {
        SourceSurface {
            reference: self.target,
            size: self.size,
            format: self.format,
        }
    }

    pub fn fill_rect(&self, rect: IntRect, color: Color) -> bool {
        self.draw(DrawOp::FillRect { rect, color })
    }

    pub fn clear(&self, rect: IntRect) -> bool {
        self.draw(DrawOp::Clear { rect })
    }

    fn draw(&self, op: DrawOp) -> bool {
        self.transport.record_event(&Event::Draw { target: self.target, op })
    }

    pub fn flush(&self) -> bool {
        self.transport.record_event(&Event::Flush)
    }

    /// Asks the translator to publish the current contents as replay
    /// texture `texture_id`.
    pub fn present(&self, texture_id: TextureId) -> bool {
        self.transport.record_event(&Event::PresentTexture {
            target: self.target,
            texture_id,
        })
    }

    /// Withdraws an unclaimed replay texture.
    pub fn release_texture(&self, texture_id: TextureId) -> bool {
        self.transport.record_event(&Event::ReleaseTexture { texture_id })
    }
}

impl Drop for DrawTarget {
    fn drop(&mut self) {
        self.transport
            .record_event(&Event::DestroyDrawTarget { target: self.target });
    }
}
