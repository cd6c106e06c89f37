use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use crossbeam::channel::{Sender, after, bounded};

use crate::config::CanvasConfig;
use crate::coords::{IntSize, SurfaceFormat, TextureType};
use crate::event::Event;
use crate::ids::ReferencePtr;
use crate::state::RemoteCanvasState;
use crate::sync::lock;
use crate::transport::{DrawEventRecorder, SharedMemory};

use super::channel::RecorderHelpers;
use super::{AliasedSurface, DataSurface, DrawTarget, SourceSurface, TranslatorChannel};

/// Readback buffers are allocated in whole pages.
const PAGE_SIZE: usize = 4096;

/// Counters for diagnostics.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Frames written to the transport, control events included.
    pub events_recorded: i64,
    pub checkpoints_created: u64,
    pub dormant_releases: u64,
    pub buffers_live: usize,
    pub transactions_since_get_data_surface: u32,
}

struct RecorderInner {
    transport: Option<Arc<DrawEventRecorder>>,

    in_transaction: bool,
    /// Checkpoint clock when the open transaction began.
    transaction_start: i64,
    transactions_since_get_data_surface: u32,

    dormant: bool,
    /// Bumped per armed timer so a late timer cannot release twice.
    dormant_epoch: u64,
    /// Dropping the sender cancels the pending release.
    dormant_cancel: Option<Sender<()>>,

    write_lock_checkpoint: Option<i64>,

    data_surface: Option<Arc<SharedMemory>>,
    data_surface_available: bool,

    deferred_alias_removals: Vec<ReferencePtr>,
}

/// Producer-side recorder for one canvas connection.
///
/// Serializes drawing into a lazily created transport, brackets work in
/// transactions and performs synchronous readback through checkpoints. The
/// thread that creates the recorder is its owning thread; readback and
/// deferred surface releases only happen there.
pub struct Recorder {
    channel: Arc<dyn TranslatorChannel>,
    config: CanvasConfig,
    state: Arc<RemoteCanvasState>,
    owner: ThreadId,
    this: Weak<Recorder>,
    inner: Mutex<RecorderInner>,
    checkpoints_created: AtomicU64,
    dormant_releases: AtomicU64,
}

impl Recorder {
    pub fn new(
        channel: Arc<dyn TranslatorChannel>,
        config: CanvasConfig,
        state: Arc<RemoteCanvasState>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            channel,
            config,
            state,
            owner: thread::current().id(),
            this: this.clone(),
            inner: Mutex::new(RecorderInner {
                transport: None,
                in_transaction: false,
                transaction_start: 0,
                transactions_since_get_data_surface: 0,
                dormant: false,
                dormant_epoch: 0,
                dormant_cancel: None,
                write_lock_checkpoint: None,
                data_surface: None,
                data_surface_available: false,
                deferred_alias_removals: Vec::new(),
            }),
            checkpoints_created: AtomicU64::new(0),
            dormant_releases: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    #[inline]
    pub fn is_deactivated(&self) -> bool {
        self.state.is_deactivated()
    }

    /// The transport, once [`Recorder::ensure_recorder`] has created it.
    pub fn transport(&self) -> Option<Arc<DrawEventRecorder>> {
        lock(&self.inner).transport.clone()
    }

    /// Creates the transport on first use and makes sure a readback buffer
    /// fits `size` pixels of `format`.
    ///
    /// # Panics
    ///
    /// When called with a different `texture_type` than the transport was
    /// created with. Only one remote texture type is supported at a time.
    pub fn ensure_recorder(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        texture_type: TextureType,
    ) -> bool {
        let transport = {
            let mut inner = lock(&self.inner);
            match &inner.transport {
                Some(transport) => transport.clone(),
                None => {
                    let helpers = RecorderHelpers::new(Arc::downgrade(&self.channel));
                    match DrawEventRecorder::init(
                        texture_type,
                        Box::new(helpers),
                        &self.config,
                        self.state.clone(),
                    ) {
                        Ok(transport) => {
                            inner.transport = Some(transport.clone());
                            transport
                        }
                        Err(e) => {
                            log::warn!("canvas transport unavailable: {e}");
                            return false;
                        }
                    }
                }
            }
        };

        assert_eq!(
            transport.texture_type(),
            texture_type,
            "only one remote texture type is supported per recorder"
        );

        self.ensure_data_surface_buffer(size, format)
    }

    /// Grows the readback buffer when the current one is too small or is
    /// still lent out. The translator is paused while it swaps buffers.
    fn ensure_data_surface_buffer(&self, size: IntSize, format: SurfaceFormat) -> bool {
        let Some(len) = size.byte_len(format) else {
            log::warn!("readback size {size:?} overflows");
            return false;
        };
        let required = len.max(1).div_ceil(PAGE_SIZE) * PAGE_SIZE;

        let mut inner = lock(&self.inner);
        let Some(transport) = inner.transport.clone() else {
            return false;
        };

        if inner.data_surface_available
            && inner.data_surface.as_ref().is_some_and(|b| b.len() >= required)
        {
            return true;
        }

        if !transport.record_event(&Event::PauseTranslation) {
            return false;
        }

        let buffer = match SharedMemory::create(required) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("readback buffer unavailable: {e}");
                return false;
            }
        };

        if !self.channel.set_data_surface_buffer(buffer.handle()) {
            log::warn!("translator did not accept readback buffer {:?}", buffer.id());
            return false;
        }

        log::debug!("readback buffer {:?} installed ({required} bytes)", buffer.id());
        inner.data_surface = Some(buffer);
        inner.data_surface_available = true;
        true
    }

    /// Records a begin marker unless a transaction is already open.
    ///
    /// Also cancels a pending dormant release.
    pub fn begin_transaction_if_needed(&self) -> bool {
        self.process_deferred_releases();

        let mut inner = lock(&self.inner);
        if inner.in_transaction {
            return true;
        }
        let Some(transport) = inner.transport.clone() else {
            return false;
        };

        inner.dormant = false;
        inner.dormant_cancel = None;

        if !transport.record_event(&Event::BeginTransaction) {
            return false;
        }
        inner.in_transaction = true;
        inner.transaction_start = transport.create_checkpoint();
        true
    }

    /// Closes the open transaction. A frame that recorded nothing arms the
    /// dormant timer, after which free transport buffers are released.
    pub fn end_transaction(&self) {
        self.process_deferred_releases();

        let mut inner = lock(&self.inner);
        inner.transactions_since_get_data_surface =
            inner.transactions_since_get_data_surface.saturating_add(1);

        let Some(transport) = inner.transport.clone() else {
            return;
        };
        if transport.is_detached() {
            return;
        }

        let empty = if inner.in_transaction {
            inner.in_transaction = false;
            let empty = transport.create_checkpoint() == inner.transaction_start;
            transport.record_event(&Event::EndTransaction);
            empty
        } else {
            true
        };

        if !empty {
            inner.dormant = false;
            inner.dormant_cancel = None;
            return;
        }

        if inner.dormant {
            return;
        }
        inner.dormant = true;
        inner.dormant_epoch += 1;
        inner.dormant_cancel = self.arm_dormant_timer(inner.dormant_epoch);
    }

    fn arm_dormant_timer(&self, epoch: u64) -> Option<Sender<()>> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let this = self.this.clone();
        let timeout = after(self.config.drop_buffer_delay);

        let spawned = thread::Builder::new()
            .name("canvas-dormant".into())
            .spawn(move || {
                crossbeam::select! {
                    recv(cancel_rx) -> _ => {}
                    recv(timeout) -> _ => {
                        if let Some(recorder) = this.upgrade() {
                            recorder.drop_free_buffers_when_dormant(epoch);
                        }
                    }
                }
            });

        match spawned {
            Ok(_) => Some(cancel_tx),
            Err(e) => {
                log::warn!("dormant timer not armed: {e}");
                None
            }
        }
    }

    fn drop_free_buffers_when_dormant(&self, epoch: u64) {
        let inner = lock(&self.inner);
        if !inner.dormant || inner.dormant_epoch != epoch {
            return;
        }
        let Some(transport) = inner.transport.as_ref().filter(|t| !t.is_detached()) else {
            return;
        };
        let dropped = transport.drop_free_buffers();
        self.dormant_releases.fetch_add(1, Ordering::Relaxed);
        log::debug!("recorder dormant, released {dropped} free buffers");
    }

    /// Marks a produced texture as possibly still being written.
    pub fn on_write_lock_taken(&self) {
        let mut inner = lock(&self.inner);
        if let Some(transport) = &inner.transport {
            let checkpoint = transport.create_checkpoint();
            self.checkpoints_created.fetch_add(1, Ordering::Relaxed);
            inner.write_lock_checkpoint = Some(checkpoint);
        }
    }

    /// Call before sharing a write-locked texture with another context.
    ///
    /// Flushes and blocks until everything up to the lock is applied, then
    /// clears the lock. Returns `false` when the wait was abandoned.
    pub fn on_handoff(&self) -> bool {
        let (transport, checkpoint) = {
            let inner = lock(&self.inner);
            match (&inner.transport, inner.write_lock_checkpoint) {
                (Some(transport), Some(checkpoint)) => (transport.clone(), checkpoint),
                _ => return true,
            }
        };

        transport.record_event(&Event::Flush);
        let applied = transport.wait_for_checkpoint(checkpoint);
        if !applied {
            log::warn!("write lock checkpoint {checkpoint} was never applied");
        }

        lock(&self.inner).write_lock_checkpoint = None;
        applied
    }

    #[inline]
    pub fn has_outstanding_write_lock(&self) -> bool {
        lock(&self.inner).write_lock_checkpoint.is_some()
    }

    /// Synchronously reads `surface` back from the translator.
    ///
    /// Only legal on the owning thread. Opens a transaction when none is
    /// open and returns once the translator has produced the pixels.
    pub fn get_data_surface(&self, surface: &SourceSurface) -> Option<DataSurface> {
        if !self.is_owning_thread() {
            log::error!("readback of {:?} requested off the owning thread", surface.reference);
            return None;
        }

        {
            let mut inner = lock(&self.inner);
            if !inner.in_transaction {
                inner.transactions_since_get_data_surface = 0;
            }
        }

        if !self.begin_transaction_if_needed() {
            return None;
        }
        let transport = self.transport()?;

        transport.record_event(&Event::PrepareDataForSurface {
            surface: surface.reference,
        });

        if !self.ensure_data_surface_buffer(surface.size, surface.format) {
            return None;
        }
        let stride = surface.size.stride(surface.format)?;

        let buffer = {
            let mut inner = lock(&self.inner);
            inner.data_surface_available = false;
            inner.data_surface.clone()?
        };

        if !transport.record_event(&Event::GetDataForSurface {
            surface: surface.reference,
        }) {
            self.return_data_surface_buffer(&buffer);
            return None;
        }
        let checkpoint = transport.create_checkpoint();
        self.checkpoints_created.fetch_add(1, Ordering::Relaxed);

        let view = DataSurface::new(buffer, surface.size, surface.format, stride, self.this.clone());
        if !transport.wait_for_checkpoint(checkpoint) {
            log::warn!("readback of {:?} abandoned", surface.reference);
            return None;
        }
        Some(view)
    }

    /// Takes back a readback buffer. Only the current buffer is reused.
    pub(crate) fn return_data_surface_buffer(&self, buffer: &Arc<SharedMemory>) {
        let mut inner = lock(&self.inner);
        if inner
            .data_surface
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, buffer))
        {
            inner.data_surface_available = true;
        } else {
            log::warn!("ignoring return of stale readback buffer {:?}", buffer.id());
        }
    }

    pub fn in_transaction(&self) -> bool {
        lock(&self.inner).in_transaction
    }

    pub fn transactions_since_get_data_surface(&self) -> u32 {
        lock(&self.inner).transactions_since_get_data_surface
    }

    /// `None` when there is no usable transport.
    pub fn create_draw_target(&self, size: IntSize, format: SurfaceFormat) -> Option<DrawTarget> {
        let transport = self.transport()?;
        if transport.is_detached() {
            return None;
        }
        DrawTarget::create(transport, size, format)
    }

    /// Wraps `surface` behind a recorded alias.
    pub fn wrap_surface(&self, surface: &SourceSurface) -> Option<AliasedSurface> {
        let transport = self.transport()?;
        if transport.is_detached() {
            return None;
        }
        Some(AliasedSurface::new(surface, transport, self.this.clone()))
    }

    pub(crate) fn defer_alias_removal(&self, alias: ReferencePtr) {
        lock(&self.inner).deferred_alias_removals.push(alias);
    }

    /// Records alias removals that were requested from other threads.
    ///
    /// Runs automatically at transaction boundaries; does nothing off the
    /// owning thread.
    pub fn process_deferred_releases(&self) {
        if !self.is_owning_thread() {
            return;
        }
        let (transport, aliases) = {
            let mut inner = lock(&self.inner);
            if inner.deferred_alias_removals.is_empty() {
                return;
            }
            (
                inner.transport.clone(),
                std::mem::take(&mut inner.deferred_alias_removals),
            )
        };
        let Some(transport) = transport else {
            return;
        };
        for alias in aliases {
            transport.record_event(&Event::RemoveSurfaceAlias { alias });
        }
    }

    pub fn record_event(&self, event: &Event) -> bool {
        self.transport().is_some_and(|t| t.record_event(event))
    }

    pub fn create_checkpoint(&self) -> Option<i64> {
        let checkpoint = self.transport()?.create_checkpoint();
        self.checkpoints_created.fetch_add(1, Ordering::Relaxed);
        Some(checkpoint)
    }

    pub fn wait_for_checkpoint(&self, checkpoint: i64) -> bool {
        self.transport()
            .is_some_and(|t| t.wait_for_checkpoint(checkpoint))
    }

    /// The translator acknowledged a device reset.
    pub fn on_device_changed(&self) {
        self.record_event(&Event::DeviceChangeAcknowledged);
    }

    /// The translator connection is gone. Everything after this is a no-op.
    pub fn on_channel_closed(&self) {
        let mut inner = lock(&self.inner);
        inner.dormant_cancel = None;
        inner.in_transaction = false;
        if let Some(transport) = &inner.transport {
            transport.detach_resources();
        }
        log::debug!("recorder detached from translator");
    }

    /// Turns remote canvas off for every recorder sharing this state.
    pub fn deactivate(&self) {
        self.state.deactivate();
        self.on_channel_closed();
    }

    pub fn clear_cached_resources(&self) {
        if let Some(transport) = self.transport() {
            transport.drop_free_buffers();
        }
    }

    /// `true` when deactivated, or when nothing but this recorder still
    /// uses the transport.
    pub fn should_be_cleaned_up(&self) -> bool {
        if self.state.is_deactivated() {
            return true;
        }
        lock(&self.inner)
            .transport
            .as_ref()
            .is_none_or(|t| Arc::strong_count(t) == 1)
    }

    pub fn stats(&self) -> RecorderStats {
        let inner = lock(&self.inner);
        let (events_recorded, buffers_live) = inner.transport.as_ref().map_or((0, 0), |t| {
            let stats = t.stats();
            (stats.frames_written, stats.buffers_live)
        });
        RecorderStats {
            events_recorded,
            checkpoints_created: self.checkpoints_created.load(Ordering::Relaxed),
            dormant_releases: self.dormant_releases.load(Ordering::Relaxed),
            buffers_live,
            transactions_since_get_data_surface: inner.transactions_since_get_data_surface,
        }
    }
}
