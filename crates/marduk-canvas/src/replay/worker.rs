use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam::channel::Receiver;

use crate::coords::TextureType;
use crate::event::{DrawOp, Event};
use crate::ids::{ReferencePtr, TextureId};
use crate::registry::SurfaceDescriptor;
use crate::transport::{ReadOutcome, SharedMemory, TransportHandle, TransportInit, TransportReader};

use super::raster::Canvas;
use super::translator::Shared;

thread_local! {
    static TRANSLATOR_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Marks the calling thread as one that produces replay textures.
pub(crate) fn mark_translator_thread() {
    TRANSLATOR_THREAD.with(|flag| flag.set(true));
}

/// `true` on a translator worker thread.
pub(crate) fn on_translator_thread() -> bool {
    TRANSLATOR_THREAD.with(Cell::get)
}

/// Messages from the producer side, serviced between translation runs.
pub(crate) enum Control {
    Install(TransportInit),
    Restart,
    SetDataSurfaceBuffer(TransportHandle),
    Close,
}

/// Translation state owned by the worker thread.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    reader: Option<TransportReader>,
    texture_type: TextureType,
    targets: HashMap<ReferencePtr, Canvas>,
    aliases: HashMap<ReferencePtr, ReferencePtr>,
    data_surface: Option<Arc<SharedMemory>>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            reader: None,
            texture_type: TextureType::Unknown,
            targets: HashMap::new(),
            aliases: HashMap::new(),
            data_surface: None,
        }
    }

    pub(crate) fn run(mut self, control: Receiver<Control>) {
        mark_translator_thread();
        for message in control {
            match message {
                Control::Install(init) => self.install(init),
                Control::Restart => self.translate(),
                Control::SetDataSurfaceBuffer(handle) => self.set_data_surface_buffer(handle),
                Control::Close => break,
            }
        }
        log::debug!("translator for {} finished", self.shared.owner.content_id);
    }

    fn install(&mut self, init: TransportInit) {
        if self.reader.is_some() {
            log::error!("transport installed twice");
            self.shared.deactivate();
            return;
        }
        match TransportReader::new(&init, self.shared.config.reader_idle_timeout, self.shared.table.clone()) {
            Ok(reader) => {
                self.texture_type = init.texture_type;
                self.reader = Some(reader);
                self.translate();
            }
            Err(e) => {
                log::error!("cannot attach to transport: {e}");
                self.shared.deactivate();
            }
        }
    }

    fn set_data_surface_buffer(&mut self, handle: TransportHandle) {
        let Some(reader) = &self.reader else {
            log::error!("readback buffer sent before a transport");
            self.shared.deactivate();
            return;
        };
        if !reader.is_paused() {
            log::error!("readback buffer {:?} sent while translation is running", handle.id());
            self.shared.deactivate();
            return;
        }
        self.data_surface = Some(handle.map());
        reader.resume();
        self.translate();
    }

    /// Applies events until the stream pauses, idles out or fails.
    fn translate(&mut self) {
        let Some(mut reader) = self.reader.take() else {
            return;
        };
        // A paused stream only resumes with a new readback buffer.
        if self.shared.is_deactivated() || reader.is_paused() {
            self.reader = Some(reader);
            return;
        }

        loop {
            match reader.next_event() {
                ReadOutcome::Event(event) => {
                    self.apply(&event);
                    reader.processed(&event);
                    self.shared.events_applied.fetch_add(1, Ordering::Relaxed);
                    if event == Event::PauseTranslation {
                        reader.pause();
                        break;
                    }
                }
                ReadOutcome::Stopped | ReadOutcome::Failed => break,
            }
        }
        self.reader = Some(reader);
    }

    fn resolve(&self, surface: ReferencePtr) -> ReferencePtr {
        self.aliases.get(&surface).copied().unwrap_or(surface)
    }

    fn apply(&mut self, event: &Event) {
        match event {
            Event::BeginTransaction | Event::EndTransaction | Event::Flush => {}
            Event::PauseTranslation | Event::DropBuffers(_) => {}
            Event::DeviceChangeAcknowledged => {
                log::debug!("device change acknowledged by {}", self.shared.owner.content_id);
            }
            Event::CreateDrawTarget { target, size, format } => match Canvas::new(*size, *format) {
                Some(canvas) => {
                    self.targets.insert(*target, canvas);
                }
                None => log::warn!("cannot create draw target {target:?} of {size:?}"),
            },
            Event::DestroyDrawTarget { target } => {
                self.targets.remove(target);
            }
            Event::Draw { target, op } => {
                let Some(canvas) = self.targets.get_mut(target) else {
                    log::warn!("draw on unknown target {target:?}");
                    return;
                };
                match *op {
                    DrawOp::FillRect { rect, color } => canvas.fill_rect(rect, color),
                    DrawOp::Clear { rect } => canvas.clear(rect),
                }
            }
            Event::AddSurfaceAlias { alias, surface } => {
                let resolved = self.resolve(*surface);
                self.aliases.insert(*alias, resolved);
            }
            Event::RemoveSurfaceAlias { alias } => {
                self.aliases.remove(alias);
            }
            Event::PrepareDataForSurface { surface } => {
                log::trace!("readback of {surface:?} announced");
            }
            Event::GetDataForSurface { surface } => self.read_back(*surface),
            Event::PresentTexture { target, texture_id } => self.present(*target, *texture_id),
            Event::ReleaseTexture { texture_id } => {
                self.shared
                    .registry
                    .remove_replay_texture(&self.shared.owner, *texture_id);
            }
        }
    }

    fn read_back(&self, surface: ReferencePtr) {
        let Some(canvas) = self.targets.get(&self.resolve(surface)) else {
            log::warn!("readback of unknown surface {surface:?}");
            return;
        };
        let Some(buffer) = &self.data_surface else {
            log::warn!("readback of {surface:?} without a readback buffer");
            return;
        };
        if !buffer.with_bytes_mut(|bytes| canvas.copy_to(bytes)) {
            log::warn!("readback buffer too small for {surface:?}");
        }
    }

    fn present(&self, target: ReferencePtr, texture_id: TextureId) {
        let Some(canvas) = self.targets.get(&target) else {
            log::warn!("present of unknown target {target:?}");
            return;
        };
        let memory = match SharedMemory::create(canvas.pixels().len().max(1)) {
            Ok(memory) => memory,
            Err(e) => {
                log::warn!("replay texture {texture_id} not produced: {e}");
                return;
            }
        };
        memory.with_bytes_mut(|bytes| canvas.copy_to(bytes));

        let desc = SurfaceDescriptor {
            texture_type: self.texture_type,
            size: canvas.size(),
            format: canvas.format(),
            stride: canvas.stride(),
            handle: memory.handle(),
        };
        self.shared
            .registry
            .add_replay_texture(&self.shared.owner, texture_id, desc);
    }
}
