//! Producer side of remote canvas.
//!
//! Responsibilities:
//! - own the transport for one canvas connection and create it lazily
//! - bracket recording in transactions, releasing free buffers when idle
//! - write-lock handoff (lock, flush, wait, clear)
//! - synchronous readback through a single lent-out readback buffer
//! - hand out recording draw targets and aliased surfaces
//!
//! The translator is reached only through [`TranslatorChannel`].

mod canvas;
mod channel;
mod draw_target;
mod surface;

pub use canvas::{Recorder, RecorderStats};
pub use channel::TranslatorChannel;
pub use draw_target::DrawTarget;
pub use surface::{AliasedSurface, DataSurface, SourceSurface};
