use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::CanvasConfig;
use crate::coords::TextureType;
use crate::error::TransportError;
use crate::event::{Event, encode};
use crate::state::RemoteCanvasState;
use crate::sync::lock;

use super::{
    BufferId, FRAME_HEADER_LEN, Header, NEXT_BUFFER_KIND, NEXT_BUFFER_LEN, SharedMemory, Signal,
    TransportHandle, TransportInit, TransportState,
};

/// Polls before a checkpoint wait parks on the writer signal.
const CHECKPOINT_SPIN_COUNT: u32 = 100;
/// Slice of a parked checkpoint wait; closure is re-checked between slices.
const CHECKPOINT_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Calls the writer makes back into whatever owns the connection to the translator.
///
/// Implementations hold only a non-owning reference to that owner; once it is
/// gone every call reports failure (`reader_closed` reports `true`).
pub trait TransportHelpers: Send + Sync {
    fn init_translator(&self, init: TransportInit) -> bool;
    fn add_buffer(&self, handle: TransportHandle) -> bool;
    fn reader_closed(&self) -> bool;
    fn restart_reader(&self) -> bool;
}

/// Counters for diagnostics.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub frames_written: i64,
    pub buffers_live: usize,
    pub buffers_recycled: usize,
    pub buffers_allocated: u64,
}

struct UsedBuffer {
    memory: Arc<SharedMemory>,
    /// Frame count when the writer left this buffer. The reader has left it
    /// once it processed any later frame.
    last_frame: i64,
}

struct WriterBuffers {
    current: Arc<SharedMemory>,
    offset: usize,
    used: VecDeque<UsedBuffer>,
    recycled: VecDeque<Arc<SharedMemory>>,
    scratch: Vec<u8>,
    allocated: u64,
    detached: bool,
}

/// Producer side of the transport: serializes events into shared buffers.
///
/// Shared (`Arc`) between the owning recorder and every draw target recording
/// through it.
pub struct DrawEventRecorder {
    texture_type: TextureType,
    header: Arc<Header>,
    reader_signal: Arc<Signal>,
    writer_signal: Arc<Signal>,
    helpers: Box<dyn TransportHelpers>,
    state: Arc<RemoteCanvasState>,
    default_buffer_size: usize,
    buffers: Mutex<WriterBuffers>,
}

impl DrawEventRecorder {
    /// Creates the header, signals and initial buffers, then installs them
    /// with the translator.
    pub fn init(
        texture_type: TextureType,
        helpers: Box<dyn TransportHelpers>,
        config: &CanvasConfig,
        state: Arc<RemoteCanvasState>,
    ) -> Result<Arc<Self>, TransportError> {
        let count = config.initial_buffer_count.max(1);
        let mut initial = Vec::with_capacity(count);
        for _ in 0..count {
            initial.push(SharedMemory::create(config.default_buffer_size)?);
        }

        let header = Arc::new(Header::new());
        let reader_signal = Arc::new(Signal::new());
        let writer_signal = Arc::new(Signal::new());

        let init = TransportInit {
            texture_type,
            header: header.clone(),
            buffers: initial.iter().map(|m| m.handle()).collect(),
            buffer_size: config.default_buffer_size,
            reader_signal: reader_signal.clone(),
            writer_signal: writer_signal.clone(),
            use_dedicated_context: true,
        };

        if !helpers.init_translator(init) {
            return Err(TransportError::Rejected("install_transport"));
        }

        let mut initial = initial.into_iter();
        let current = initial.next().ok_or(TransportError::Closed)?;

        log::debug!(
            "transport installed: {texture_type:?}, {count} x {} byte buffers",
            config.default_buffer_size
        );

        Ok(Arc::new(Self {
            texture_type,
            header,
            reader_signal,
            writer_signal,
            helpers,
            state,
            default_buffer_size: config.default_buffer_size,
            buffers: Mutex::new(WriterBuffers {
                current,
                offset: 0,
                used: VecDeque::new(),
                recycled: initial.collect(),
                scratch: Vec::new(),
                allocated: count as u64,
                detached: false,
            }),
        }))
    }

    #[inline]
    pub fn texture_type(&self) -> TextureType {
        self.texture_type
    }

    #[inline]
    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    pub fn is_detached(&self) -> bool {
        lock(&self.buffers).detached
    }

    /// Appends one event to the stream and wakes the reader if needed.
    ///
    /// Returns `false` when nothing was recorded (detached, deactivated, or
    /// the transport failed while growing).
    pub fn record_event(&self, event: &Event) -> bool {
        if self.state.is_deactivated() {
            return false;
        }

        {
            let mut buffers = lock(&self.buffers);
            if buffers.detached {
                return false;
            }

            let mut scratch = std::mem::take(&mut buffers.scratch);
            scratch.clear();
            scratch.extend_from_slice(&[0; FRAME_HEADER_LEN]);
            let kind = encode(event, &mut scratch);
            let payload_len = scratch.len() - FRAME_HEADER_LEN;
            scratch[..4].copy_from_slice(&kind.to_le_bytes());
            scratch[4..8].copy_from_slice(&(payload_len as u32).to_le_bytes());

            let result = self.write_frame(&mut buffers, &scratch);
            buffers.scratch = scratch;

            if let Err(e) = result {
                log::error!("failed to record {}: {e}", event.name());
                buffers.detached = true;
                self.header.set_writer_state(TransportState::Failed);
                return false;
            }

            self.header.publish_frame(!event.is_control());
            log::trace!("recorded {} (frame {})", event.name(), self.header.frame_count());
        }

        self.check_and_signal_reader();
        true
    }

    fn write_frame(&self, buffers: &mut WriterBuffers, frame: &[u8]) -> Result<(), TransportError> {
        let capacity = buffers.current.len();
        if buffers.offset + frame.len() + NEXT_BUFFER_LEN > capacity {
            self.switch_buffer(buffers, frame.len() + NEXT_BUFFER_LEN)?;
        }
        buffers.current.write(buffers.offset, frame)?;
        buffers.offset += frame.len();
        Ok(())
    }

    /// Moves writing to a buffer with room for `required` bytes, leaving a
    /// `NextBuffer` frame behind for the reader.
    fn switch_buffer(&self, buffers: &mut WriterBuffers, required: usize) -> Result<(), TransportError> {
        self.reclaim(buffers);

        let next = match buffers.recycled.iter().position(|m| m.len() >= required) {
            Some(pos) => buffers.recycled.remove(pos).ok_or(TransportError::Closed)?,
            None => {
                let size = self.default_buffer_size.max(required);
                let memory = SharedMemory::create(size)?;
                if !self.helpers.add_buffer(memory.handle()) {
                    return Err(TransportError::Rejected("add_buffer"));
                }
                buffers.allocated += 1;
                log::debug!("transport grew: {:?} ({size} bytes)", memory.id());
                memory
            }
        };

        let mut marker = [0u8; NEXT_BUFFER_LEN];
        marker[..4].copy_from_slice(&NEXT_BUFFER_KIND.to_le_bytes());
        marker[4..8].copy_from_slice(&(size_of::<u64>() as u32).to_le_bytes());
        marker[8..].copy_from_slice(&next.id().0.to_le_bytes());
        buffers.current.write(buffers.offset, &marker)?;

        let previous = std::mem::replace(&mut buffers.current, next);
        buffers.offset = 0;
        buffers.used.push_back(UsedBuffer {
            memory: previous,
            last_frame: self.header.frame_count(),
        });
        Ok(())
    }

    /// Moves buffers the reader has left onto the recycled list.
    fn reclaim(&self, buffers: &mut WriterBuffers) {
        let processed = self.header.frames_processed();
        while buffers.used.front().is_some_and(|u| processed > u.last_frame) {
            if let Some(done) = buffers.used.pop_front() {
                buffers.recycled.push_back(done.memory);
            }
        }
    }

    /// Wakes or restarts the reader when it is idle and frames are pending.
    fn check_and_signal_reader(&self) {
        loop {
            match self.header.reader_state() {
                TransportState::Processing | TransportState::Paused | TransportState::Failed => {
                    return;
                }
                TransportState::AboutToWait => {
                    // The reader is deciding whether to park; wait for the decision.
                    if self.helpers.reader_closed() {
                        return;
                    }
                    std::thread::yield_now();
                }
                TransportState::Waiting => {
                    if !self.header.has_pending_frames() {
                        return;
                    }
                    if self
                        .header
                        .swap_reader_state(TransportState::Waiting, TransportState::Processing)
                    {
                        self.reader_signal.signal();
                        return;
                    }
                    // Lost the race against the reader stopping; re-evaluate.
                }
                TransportState::Stopped => {
                    if self.header.has_pending_frames() {
                        self.header.set_reader_state(TransportState::Processing);
                        if !self.helpers.restart_reader() {
                            log::warn!("translator refused restart");
                            self.header.set_writer_state(TransportState::Failed);
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Current position of the checkpoint clock.
    #[inline]
    pub fn create_checkpoint(&self) -> i64 {
        self.header.event_count()
    }

    /// Blocks until the translator has applied everything up to `checkpoint`.
    ///
    /// There is no timeout: the wait ends on progress, or is abandoned
    /// (`false`) when the reader closes or fails or the process deactivates.
    pub fn wait_for_checkpoint(&self, checkpoint: i64) -> bool {
        for _ in 0..CHECKPOINT_SPIN_COUNT {
            if self.header.processed_count() >= checkpoint {
                return true;
            }
            std::hint::spin_loop();
        }

        if self.header.writer_state() == TransportState::Failed {
            return false;
        }

        self.header.set_writer_state(TransportState::AboutToWait);
        if self.header.processed_count() >= checkpoint {
            self.header.set_writer_state(TransportState::Processing);
            return true;
        }

        self.header.set_writer_wait_count(checkpoint);
        self.header.set_writer_state(TransportState::Waiting);

        while !self.helpers.reader_closed()
            && self.header.reader_state() != TransportState::Failed
            && !self.state.is_deactivated()
        {
            if self.header.processed_count() >= checkpoint {
                self.header.set_writer_state(TransportState::Processing);
                return true;
            }
            // A permit may be stale from an earlier wait; the loop re-checks.
            self.writer_signal.wait(CHECKPOINT_WAIT_SLICE);
        }

        if self.header.processed_count() >= checkpoint {
            self.header.set_writer_state(TransportState::Processing);
            return true;
        }

        log::warn!("abandoning wait for checkpoint {checkpoint}: reader gone");
        self.header.set_writer_state(TransportState::Failed);
        false
    }

    /// Releases every buffer the reader is done with. Returns how many.
    pub fn drop_free_buffers(&self) -> usize {
        let dropped: Vec<BufferId> = {
            let mut buffers = lock(&self.buffers);
            if buffers.detached {
                return 0;
            }
            self.reclaim(&mut buffers);
            buffers.recycled.drain(..).map(|m| m.id()).collect()
        };

        if dropped.is_empty() {
            return 0;
        }

        log::debug!("dropping {} free transport buffers", dropped.len());
        let count = dropped.len();
        self.record_event(&Event::DropBuffers(dropped));
        count
    }

    /// Stops all further recording and lets go of everything but the header.
    pub fn detach_resources(&self) {
        let mut buffers = lock(&self.buffers);
        if buffers.detached {
            return;
        }
        buffers.detached = true;
        buffers.used.clear();
        buffers.recycled.clear();
        self.header.set_writer_state(TransportState::Failed);
        // Unpark a writer waiting on a checkpoint so it re-checks closure.
        self.writer_signal.signal();
        log::debug!("transport detached");
    }

    pub fn stats(&self) -> WriterStats {
        let buffers = lock(&self.buffers);
        WriterStats {
            frames_written: self.header.frame_count(),
            buffers_live: 1 + buffers.used.len() + buffers.recycled.len(),
            buffers_recycled: buffers.recycled.len(),
            buffers_allocated: buffers.allocated,
        }
    }
}
