use crate::coords::SurfaceFormat;

/// Linear premultiplied RGBA color.
///
/// Invariant: `rgb` components are already multiplied by `a`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32, // premultiplied
    pub g: f32, // premultiplied
    pub b: f32, // premultiplied
    pub a: f32,
}

impl Color {
    #[inline]
    pub const fn transparent() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 }
    }

    /// Creates a premultiplied color from straight sRGB bytes (`0`–`255`).
    #[inline]
    pub fn from_srgb_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from_straight(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    #[inline]
    pub const fn from_premul(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a premultiplied color from straight alpha components.
    #[inline]
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        let a = a.clamp(0.0, 1.0);
        Self {
            r: r.clamp(0.0, 1.0) * a,
            g: g.clamp(0.0, 1.0) * a,
            b: b.clamp(0.0, 1.0) * a,
            a,
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    /// Clamps all channels to [0, 1] and enforces premultiplication.
    #[inline]
    pub fn clamped(self) -> Self {
        let a = self.a.clamp(0.0, 1.0);
        Self {
            r: self.r.clamp(0.0, a),
            g: self.g.clamp(0.0, a),
            b: self.b.clamp(0.0, a),
            a,
        }
    }

    pub(crate) fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub(crate) fn from_array(v: [f32; 4]) -> Self {
        Self { r: v[0], g: v[1], b: v[2], a: v[3] }
    }

    /// Encodes one pixel of `format`. Returns the bytes in memory order; only
    /// the first `format.bytes_per_pixel()` entries are meaningful.
    pub fn to_pixel(self, format: SurfaceFormat) -> [u8; 4] {
        let c = if self.is_finite() { self.clamped() } else { Color::transparent() };
        let q = |v: f32| (v * 255.0 + 0.5) as u8;
        match format {
            SurfaceFormat::B8G8R8A8 => [q(c.b), q(c.g), q(c.r), q(c.a)],
            SurfaceFormat::B8G8R8X8 => [q(c.b), q(c.g), q(c.r), 255],
            SurfaceFormat::R8G8B8A8 => [q(c.r), q(c.g), q(c.b), q(c.a)],
            SurfaceFormat::A8 => [q(c.a), 0, 0, 0],
        }
    }
}
