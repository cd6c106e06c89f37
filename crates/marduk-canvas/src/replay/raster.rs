use crate::coords::{IntRect, IntSize, SurfaceFormat};
use crate::paint::Color;

/// Software pixel storage for one replayed draw target.
///
/// Rows are tightly packed; `stride == width * bytes_per_pixel`.
#[derive(Debug, Clone)]
pub(crate) struct Canvas {
    size: IntSize,
    format: SurfaceFormat,
    stride: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    /// `None` for sizes that cannot be addressed.
    pub(crate) fn new(size: IntSize, format: SurfaceFormat) -> Option<Self> {
        let stride = size.stride(format)?;
        let len = size.byte_len(format)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).ok()?;
        pixels.resize(len, 0);
        let mut canvas = Self { size, format, stride, pixels };
        if format == SurfaceFormat::B8G8R8X8 {
            canvas.clear(IntRect::from_size(size));
        }
        Some(canvas)
    }

    #[inline]
    pub(crate) fn size(&self) -> IntSize {
        self.size
    }

    #[inline]
    pub(crate) fn format(&self) -> SurfaceFormat {
        self.format
    }

    #[inline]
    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub(crate) fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Source-over fill of `rect` (clipped to the canvas).
    pub(crate) fn fill_rect(&mut self, rect: IntRect, color: Color) {
        let src = color.to_pixel(self.format);
        let src_alpha = color.to_pixel(SurfaceFormat::A8)[0];
        let keep = 255 - u16::from(src_alpha);
        let opaque_x = self.format == SurfaceFormat::B8G8R8X8;

        self.for_each_pixel(rect, |px| {
            for (d, s) in px.iter_mut().zip(src) {
                let dst = (u16::from(*d) * keep + 127) / 255;
                *d = s.saturating_add(dst as u8);
            }
            if opaque_x {
                px[3] = 255;
            }
        });
    }

    /// Resets `rect` to transparent (opaque black for formats without alpha).
    pub(crate) fn clear(&mut self, rect: IntRect) {
        let cleared = Color::transparent().to_pixel(self.format);
        self.for_each_pixel(rect, |px| px.copy_from_slice(&cleared[..px.len()]));
    }

    fn for_each_pixel(&mut self, rect: IntRect, mut f: impl FnMut(&mut [u8])) {
        let Some(clip) = rect.intersect(IntRect::from_size(self.size)) else {
            return;
        };
        let bpp = self.format.bytes_per_pixel();
        for y in clip.y..clip.max_y() {
            let row = y as usize * self.stride;
            let start = row + clip.x as usize * bpp;
            let end = row + clip.max_x() as usize * bpp;
            for px in self.pixels[start..end].chunks_exact_mut(bpp) {
                f(px);
            }
        }
    }

    /// Copies the packed pixels into `out`. Returns `false` if `out` is too small.
    pub(crate) fn copy_to(&self, out: &mut [u8]) -> bool {
        match out.get_mut(..self.pixels.len()) {
            Some(dst) => {
                dst.copy_from_slice(&self.pixels);
                true
            }
            None => false,
        }
    }
}
