use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::event::{Event, decode};
use crate::sync::lock;

use super::{
    BufferId, FRAME_HEADER_LEN, Header, NEXT_BUFFER_KIND, SharedMemory, Signal, TransportHandle,
    TransportInit, TransportState,
};

/// Buffers known to a reader, keyed by id.
///
/// Cloned handles share one table so buffers can be installed from the
/// connection thread while the reader is translating elsewhere.
#[derive(Debug, Clone, Default)]
pub struct BufferTable {
    buffers: Arc<Mutex<HashMap<BufferId, Arc<SharedMemory>>>>,
}

impl BufferTable {
    pub fn insert(&self, handle: &TransportHandle) {
        lock(&self.buffers).insert(handle.id(), handle.map());
    }

    pub fn remove(&self, id: BufferId) -> bool {
        lock(&self.buffers).remove(&id).is_some()
    }

    pub fn get(&self, id: BufferId) -> Option<Arc<SharedMemory>> {
        lock(&self.buffers).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.buffers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of asking the reader for the next event.
#[derive(Debug, PartialEq)]
pub enum ReadOutcome {
    Event(Event),
    /// Idle timeout expired with nothing pending; the writer restarts us.
    Stopped,
    /// The reader was failed (deactivation or a malformed stream).
    Failed,
}

/// Consumer side of the transport.
pub struct TransportReader {
    header: Arc<Header>,
    reader_signal: Arc<Signal>,
    writer_signal: Arc<Signal>,
    table: BufferTable,
    current: Arc<SharedMemory>,
    offset: usize,
    idle_timeout: Duration,
    payload: Vec<u8>,
}

impl TransportReader {
    /// Attaches to an installed transport. `table` receives the initial
    /// buffers and, later, every buffer the writer adds.
    pub fn new(
        init: &TransportInit,
        idle_timeout: Duration,
        table: BufferTable,
    ) -> Result<Self, TransportError> {
        for handle in &init.buffers {
            table.insert(handle);
        }
        let current = init
            .buffers
            .first()
            .map(TransportHandle::map)
            .ok_or(TransportError::Malformed("transport installed without buffers"))?;

        Ok(Self {
            header: init.header.clone(),
            reader_signal: init.reader_signal.clone(),
            writer_signal: init.writer_signal.clone(),
            table,
            current,
            offset: 0,
            idle_timeout,
            payload: Vec::new(),
        })
    }

    #[inline]
    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    /// Returns the next event, parking up to the idle timeout when none is pending.
    pub fn next_event(&mut self) -> ReadOutcome {
        loop {
            if self.header.reader_state() == TransportState::Failed {
                return ReadOutcome::Failed;
            }

            if self.header.has_pending_frames() {
                return match self.read_frame() {
                    Ok(event) => ReadOutcome::Event(event),
                    Err(e) => {
                        log::error!("translator stream is corrupt: {e}");
                        self.fail();
                        ReadOutcome::Failed
                    }
                };
            }

            if !self
                .header
                .swap_reader_state(TransportState::Processing, TransportState::AboutToWait)
            {
                // Failed from outside, or resumed out of a pause/stop.
                if self.header.reader_state() == TransportState::Failed {
                    return ReadOutcome::Failed;
                }
                self.header.set_reader_state(TransportState::Processing);
                continue;
            }
            if self.header.has_pending_frames() {
                self.header
                    .swap_reader_state(TransportState::AboutToWait, TransportState::Processing);
                continue;
            }

            if !self
                .header
                .swap_reader_state(TransportState::AboutToWait, TransportState::Waiting)
            {
                continue;
            }
            if self.reader_signal.wait(self.idle_timeout) {
                // The writer flipped us back to Processing before signalling.
                continue;
            }

            if self
                .header
                .swap_reader_state(TransportState::Waiting, TransportState::Stopped)
            {
                log::trace!("translator idle, stopping");
                return ReadOutcome::Stopped;
            }

            if self.header.reader_state() == TransportState::Failed {
                return ReadOutcome::Failed;
            }

            // The writer won the race and is about to signal; take that permit.
            self.reader_signal.wait(self.idle_timeout);
        }
    }

    fn read_frame(&mut self) -> Result<Event, TransportError> {
        loop {
            let mut frame_header = [0u8; FRAME_HEADER_LEN];
            self.current.read(self.offset, &mut frame_header)?;
            let [k0, k1, k2, k3, l0, l1, l2, l3] = frame_header;
            let kind = u32::from_le_bytes([k0, k1, k2, k3]);
            let len = u32::from_le_bytes([l0, l1, l2, l3]) as usize;

            if len > self.current.len() {
                return Err(TransportError::Malformed("frame longer than its buffer"));
            }
            self.payload.resize(len, 0);
            self.current.read(self.offset + FRAME_HEADER_LEN, &mut self.payload)?;

            if kind == NEXT_BUFFER_KIND {
                let raw: [u8; 8] = self
                    .payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| TransportError::Malformed("bad buffer switch"))?;
                let id = BufferId(u64::from_le_bytes(raw));
                self.current = self
                    .table
                    .get(id)
                    .ok_or(TransportError::Malformed("switch to unknown buffer"))?;
                self.offset = 0;
                continue;
            }

            self.offset += FRAME_HEADER_LEN + len;
            let event = decode(kind, &self.payload)?;
            if let Event::DropBuffers(ids) = &event {
                for id in ids {
                    self.table.remove(*id);
                }
            }
            return Ok(event);
        }
    }

    /// Acknowledges `event` as applied and wakes a writer waiting on it.
    pub fn processed(&self, event: &Event) {
        let processed = self.header.acknowledge_frame(!event.is_control());
        if self.header.writer_state() == TransportState::Waiting
            && processed >= self.header.writer_wait_count()
            && self
                .header
                .swap_writer_state(TransportState::Waiting, TransportState::Processing)
        {
            self.writer_signal.signal();
        }
    }

    /// Halts at a `PauseTranslation` event. The writer will not wake us.
    pub fn pause(&self) {
        self.header.set_reader_state(TransportState::Paused);
    }

    pub fn is_paused(&self) -> bool {
        self.header.reader_state() == TransportState::Paused
    }

    /// Leaves the paused or stopped state.
    pub fn resume(&self) {
        self.header.set_reader_state(TransportState::Processing);
    }

    /// Marks the reader failed and wakes both sides so they notice.
    pub fn fail(&self) {
        fail_transport(&self.header, &self.reader_signal, &self.writer_signal);
    }
}

/// Fails a transport from outside the reader's own thread.
pub(crate) fn fail_transport(header: &Header, reader_signal: &Signal, writer_signal: &Signal) {
    header.set_reader_state(TransportState::Failed);
    reader_signal.signal();
    writer_signal.signal();
}
