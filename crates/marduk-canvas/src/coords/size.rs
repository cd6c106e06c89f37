use super::SurfaceFormat;

/// Surface dimensions in device pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    pub width: i32,
    pub height: i32,
}

impl IntSize {
    #[inline]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Bytes per row for `format`, or `None` for negative or overflowing sizes.
    #[inline]
    pub fn stride(self, format: SurfaceFormat) -> Option<usize> {
        let width = usize::try_from(self.width).ok()?;
        width.checked_mul(format.bytes_per_pixel())
    }

    /// Total byte size of a tightly packed surface of this size.
    #[inline]
    pub fn byte_len(self, format: SurfaceFormat) -> Option<usize> {
        let height = usize::try_from(self.height).ok()?;
        self.stride(format)?.checked_mul(height)
    }
}
