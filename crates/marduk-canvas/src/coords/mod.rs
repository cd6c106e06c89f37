//! Integer pixel geometry and surface formats.
//!
//! Recorded surfaces are addressed in device pixels:
//! - origin top-left
//! - +X right, +Y down
//! - rows are `width * bytes_per_pixel` bytes, tightly packed unless a stride says otherwise

mod format;
mod rect;
mod size;

pub use format::{SurfaceFormat, TextureType};
pub use rect::IntRect;
pub use size::IntSize;
