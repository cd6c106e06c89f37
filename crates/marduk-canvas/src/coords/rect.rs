use super::IntSize;

/// Axis-aligned integer rectangle (top-left origin, half-open on the max edges).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IntRect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub const fn from_size(size: IntSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub fn max_x(self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn max_y(self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.max_x() && y < self.max_y()
    }

    /// Overlap of two rectangles. Touching edges do not intersect.
    #[inline]
    pub fn intersect(self, other: IntRect) -> Option<IntRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());

        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(IntRect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }
}
