use std::sync::{Arc, Weak};

use crate::coords::{IntSize, SurfaceFormat};
use crate::event::Event;
use crate::ids::ReferencePtr;
use crate::transport::{DrawEventRecorder, SharedMemory};

use super::Recorder;

/// A recorded surface as the producer sees it: a name in the event stream
/// plus its dimensions. The pixels live with the translator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SourceSurface {
    pub reference: ReferencePtr,
    pub size: IntSize,
    pub format: SurfaceFormat,
}

/// Surface that forwards to another recorded surface through an alias.
///
/// The alias is added to the stream on construction and removed on drop.
/// A drop away from the recorder's owning thread is deferred until that
/// thread next touches the recorder.
pub struct AliasedSurface {
    surface: SourceSurface,
    transport: Arc<DrawEventRecorder>,
    owner: Weak<Recorder>,
}

impl AliasedSurface {
    pub(crate) fn new(
        target: &SourceSurface,
        transport: Arc<DrawEventRecorder>,
        owner: Weak<Recorder>,
    ) -> Self {
        let alias = ReferencePtr::next();
        transport.record_event(&Event::AddSurfaceAlias {
            alias,
            surface: target.reference,
        });
        Self {
            surface: SourceSurface {
                reference: alias,
                ..*target
            },
            transport,
            owner,
        }
    }

    #[inline]
    pub fn surface(&self) -> &SourceSurface {
        &self.surface
    }

    /// Reads the aliased pixels back. Only possible on the owning thread;
    /// elsewhere this returns `None`.
    pub fn data_surface(&self) -> Option<DataSurface> {
        let owner = self.owner.upgrade()?;
        if !owner.is_owning_thread() {
            return None;
        }
        owner.get_data_surface(&self.surface)
    }
}

impl Drop for AliasedSurface {
    fn drop(&mut self) {
        let alias = self.surface.reference;
        match self.owner.upgrade() {
            Some(owner) if !owner.is_owning_thread() => owner.defer_alias_removal(alias),
            _ => {
                self.transport.record_event(&Event::RemoveSurfaceAlias { alias });
            }
        }
    }
}

/// View over the readback buffer after a synchronous readback.
///
/// Dropping it hands the buffer back to the recorder for reuse, unless the
/// recorder has since moved to a newer buffer.
pub struct DataSurface {
    buffer: Arc<SharedMemory>,
    size: IntSize,
    format: SurfaceFormat,
    stride: usize,
    owner: Weak<Recorder>,
}

impl DataSurface {
    pub(crate) fn new(
        buffer: Arc<SharedMemory>,
        size: IntSize,
        format: SurfaceFormat,
        stride: usize,
        owner: Weak<Recorder>,
    ) -> Self {
        Self { buffer, size, format, stride, owner }
    }

    #[inline]
    pub fn size(&self) -> IntSize {
        self.size
    }

    #[inline]
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Calls `f` with the packed pixel rows (`stride * height` bytes).
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let len = self.stride * self.size.height.max(0) as usize;
        self.buffer.with_bytes(|bytes| f(&bytes[..len.min(bytes.len())]))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.with_data(<[u8]>::to_vec)
    }

    /// Pixel at `(x, y)` in storage byte order, or `None` out of bounds.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride + x as usize * bpp;
        self.with_data(|data| {
            let mut px = [0u8; 4];
            px[..bpp].copy_from_slice(data.get(start..start + bpp)?);
            Some(px)
        })
    }
}

impl Drop for DataSurface {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.return_data_surface_buffer(&self.buffer);
        }
    }
}
