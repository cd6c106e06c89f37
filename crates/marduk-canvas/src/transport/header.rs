use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// State of one side of the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum TransportState {
    Processing = 0,
    /// Deciding whether to park. The other side must not assume either outcome yet.
    AboutToWait = 1,
    Waiting = 2,
    /// Reader only: halted at a `PauseTranslation` event until resumed.
    Paused = 3,
    /// Reader only: idle timeout expired, needs a restart to continue.
    Stopped = 4,
    Failed = 5,
}

impl TransportState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => TransportState::Processing,
            1 => TransportState::AboutToWait,
            2 => TransportState::Waiting,
            3 => TransportState::Paused,
            4 => TransportState::Stopped,
            _ => TransportState::Failed,
        }
    }
}

/// Counters and states shared by the writer and the reader.
///
/// Invariants:
/// - `frames_processed <= frame_count` and `processed_count <= event_count`
/// - counters only grow
/// - `event_count` counts canvas events only; it is the checkpoint clock
///
/// Each side stores its own counter or state and then loads the other's;
/// every access is `SeqCst` so the two sides cannot both miss a wakeup.
#[derive(Debug)]
pub struct Header {
    frame_count: AtomicI64,
    frames_processed: AtomicI64,
    event_count: AtomicI64,
    processed_count: AtomicI64,
    writer_wait_count: AtomicI64,
    reader_state: AtomicU32,
    writer_state: AtomicU32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            frame_count: AtomicI64::new(0),
            frames_processed: AtomicI64::new(0),
            event_count: AtomicI64::new(0),
            processed_count: AtomicI64::new(0),
            writer_wait_count: AtomicI64::new(0),
            reader_state: AtomicU32::new(TransportState::Processing as u32),
            writer_state: AtomicU32::new(TransportState::Processing as u32),
        }
    }
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn frame_count(&self) -> i64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn frames_processed(&self) -> i64 {
        self.frames_processed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn event_count(&self) -> i64 {
        self.event_count.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn processed_count(&self) -> i64 {
        self.processed_count.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn writer_wait_count(&self) -> i64 {
        self.writer_wait_count.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn has_pending_frames(&self) -> bool {
        self.frames_processed() < self.frame_count()
    }

    #[inline]
    pub fn reader_state(&self) -> TransportState {
        TransportState::from_raw(self.reader_state.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn writer_state(&self) -> TransportState {
        TransportState::from_raw(self.writer_state.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn set_reader_state(&self, state: TransportState) {
        self.reader_state.store(state as u32, Ordering::SeqCst);
    }

    #[inline]
    pub fn set_writer_state(&self, state: TransportState) {
        self.writer_state.store(state as u32, Ordering::SeqCst);
    }

    pub fn swap_reader_state(&self, from: TransportState, to: TransportState) -> bool {
        self.reader_state
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn swap_writer_state(&self, from: TransportState, to: TransportState) -> bool {
        self.writer_state
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Publishes one written frame. Canvas events also advance the checkpoint clock.
    pub(crate) fn publish_frame(&self, is_canvas_event: bool) {
        if is_canvas_event {
            self.event_count.fetch_add(1, Ordering::SeqCst);
        }
        self.frame_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Acknowledges one applied frame and returns the processed canvas event count.
    pub(crate) fn acknowledge_frame(&self, is_canvas_event: bool) -> i64 {
        let processed = if is_canvas_event {
            self.processed_count.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.processed_count()
        };
        self.frames_processed.fetch_add(1, Ordering::SeqCst);
        processed
    }

    pub(crate) fn set_writer_wait_count(&self, checkpoint: i64) {
        self.writer_wait_count.store(checkpoint, Ordering::SeqCst);
    }
}
