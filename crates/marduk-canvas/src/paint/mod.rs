//! Paint model for recorded drawing operations.
//!
//! Colors travel through the transport as linear premultiplied RGBA and are
//! resolved to 8-bit pixels only on the replay side.

mod color;

pub use color::Color;
