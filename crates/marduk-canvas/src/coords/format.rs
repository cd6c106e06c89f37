/// Pixel layout of a recorded surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    B8G8R8A8,
    B8G8R8X8,
    R8G8B8A8,
    A8,
}

impl SurfaceFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            SurfaceFormat::B8G8R8A8 | SurfaceFormat::B8G8R8X8 | SurfaceFormat::R8G8B8A8 => 4,
            SurfaceFormat::A8 => 1,
        }
    }

    pub(crate) const fn to_raw(self) -> u32 {
        match self {
            SurfaceFormat::B8G8R8A8 => 0,
            SurfaceFormat::B8G8R8X8 => 1,
            SurfaceFormat::R8G8B8A8 => 2,
            SurfaceFormat::A8 => 3,
        }
    }

    pub(crate) const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SurfaceFormat::B8G8R8A8),
            1 => Some(SurfaceFormat::B8G8R8X8),
            2 => Some(SurfaceFormat::R8G8B8A8),
            3 => Some(SurfaceFormat::A8),
            _ => None,
        }
    }
}

/// Kind of texture the remote side produces for a recorder.
///
/// A process supports exactly one concurrent remote texture type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    Unknown,
    Shmem,
    D3D11,
    MacIOSurface,
    Dmabuf,
}
