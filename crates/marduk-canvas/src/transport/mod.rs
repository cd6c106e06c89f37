//! Shared-memory transport between one recorder and one translator.
//!
//! Layout:
//! - a [`Header`] of atomics both sides observe (frame/event counters, reader
//!   and writer states)
//! - a set of fixed-capacity [`SharedMemory`] buffers carrying frames
//! - two [`Signal`]s: the writer wakes the reader, the reader wakes a writer
//!   parked on a checkpoint
//!
//! Frame format: `[kind: u32][len: u32][payload; len]`, little endian.
//! Kind 0 switches the reader to the buffer named in its payload.

mod header;
mod memory;
mod reader;
mod signal;
mod writer;

pub use header::{Header, TransportState};
pub use memory::{BufferId, SharedMemory, TransportHandle};
pub use reader::{BufferTable, ReadOutcome, TransportReader};
pub(crate) use reader::fail_transport;
pub use signal::Signal;
pub use writer::{DrawEventRecorder, TransportHelpers, WriterStats};

use std::sync::Arc;

use crate::coords::TextureType;

pub(crate) const FRAME_HEADER_LEN: usize = 8;
pub(crate) const NEXT_BUFFER_KIND: u32 = 0;
/// Space every buffer keeps free for the trailing buffer switch.
pub(crate) const NEXT_BUFFER_LEN: usize = FRAME_HEADER_LEN + size_of::<u64>();

/// Everything a translator needs to attach to a recorder's stream.
///
/// Handed over once, at installation.
#[derive(Debug, Clone)]
pub struct TransportInit {
    pub texture_type: TextureType,
    pub header: Arc<Header>,
    /// Initial buffers. The first one is where the stream starts.
    pub buffers: Vec<TransportHandle>,
    pub buffer_size: usize,
    pub reader_signal: Arc<Signal>,
    pub writer_signal: Arc<Signal>,
    /// Run translation on a context dedicated to this recorder.
    pub use_dedicated_context: bool,
}
