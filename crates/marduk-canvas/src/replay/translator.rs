use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, unbounded};

use crate::config::CanvasConfig;
use crate::error::TransportError;
use crate::ids::{ContentId, ManagerId};
use crate::recorder::TranslatorChannel;
use crate::registry::{ReplayTextureOwner, ReplayTextureRegistry};
use crate::state::RemoteCanvasState;
use crate::sync::lock;
use crate::transport::{BufferTable, TransportHandle, TransportInit, fail_transport};

use super::worker::{Control, Worker};

/// Identity under which a translator deposits replay textures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureOwner {
    pub content_id: ContentId,
    pub manager_id: ManagerId,
}

impl ReplayTextureOwner for TextureOwner {
    fn content_id(&self) -> ContentId {
        self.content_id
    }

    fn manager_id(&self) -> ManagerId {
        self.manager_id
    }
}

/// State shared between a translator handle and its worker thread.
pub(crate) struct Shared {
    pub(crate) owner: TextureOwner,
    pub(crate) config: CanvasConfig,
    pub(crate) registry: Arc<ReplayTextureRegistry>,
    pub(crate) table: BufferTable,
    pub(crate) events_applied: AtomicU64,
    state: Arc<RemoteCanvasState>,
    transport: Mutex<Option<TransportInit>>,
    deactivated: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::Acquire) || self.state.is_deactivated()
    }

    /// Stops translating for good and releases any waiting writer.
    pub(crate) fn deactivate(&self) {
        if self.deactivated.swap(true, Ordering::AcqRel) {
            return;
        }
        log::warn!("translator for {} deactivated", self.owner.content_id);
        self.fail_transport();
        self.registry.remove_replay_textures(&self.owner);
    }

    fn fail_transport(&self) {
        if let Some(init) = lock(&self.transport).as_ref() {
            fail_transport(&init.header, &init.reader_signal, &init.writer_signal);
        }
    }
}

/// In-process translator: replays one recorder's stream on its own thread
/// into software surfaces.
///
/// Messages from the recorder are queued and serviced whenever translation
/// pauses or idles out.
pub struct LocalTranslator {
    shared: Arc<Shared>,
    control: Mutex<Option<Sender<Control>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocalTranslator {
    pub fn spawn(
        owner: TextureOwner,
        config: CanvasConfig,
        registry: Arc<ReplayTextureRegistry>,
        state: Arc<RemoteCanvasState>,
    ) -> Result<Arc<Self>, TransportError> {
        let shared = Arc::new(Shared {
            owner,
            config,
            registry,
            table: BufferTable::default(),
            events_applied: AtomicU64::new(0),
            state,
            transport: Mutex::new(None),
            deactivated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let (tx, rx) = unbounded();
        let worker = Worker::new(shared.clone());
        let handle = thread::Builder::new()
            .name(format!("canvas-translator-{}", owner.manager_id))
            .spawn(move || worker.run(rx))
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        log::debug!("translator spawned for {} (manager {})", owner.content_id, owner.manager_id);
        Ok(Arc::new(Self {
            shared,
            control: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }))
    }

    #[inline]
    pub fn owner(&self) -> TextureOwner {
        self.shared.owner
    }

    /// Events applied so far, control events included.
    pub fn events_applied(&self) -> u64 {
        self.shared.events_applied.load(Ordering::Relaxed)
    }

    pub fn is_deactivated(&self) -> bool {
        self.shared.is_deactivated()
    }

    /// Stops translation permanently. Recorders waiting on this translator
    /// give up.
    pub fn deactivate(&self) {
        self.shared.deactivate();
    }

    /// Tears the translator down and purges the textures it deposited.
    /// Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = lock(&self.control).take() {
            let _ = tx.send(Control::Close);
        }
        self.shared.fail_transport();
        let removed = self.shared.registry.remove_replay_textures(&self.shared.owner);
        log::debug!(
            "translator for {} closed, {removed} replay textures purged",
            self.shared.owner.content_id
        );

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("translator thread panicked");
            }
        }
    }

    fn send(&self, message: Control) -> bool {
        if self.is_closed() {
            return false;
        }
        lock(&self.control)
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }
}

impl TranslatorChannel for LocalTranslator {
    fn install_transport(&self, init: TransportInit) -> bool {
        *lock(&self.shared.transport) = Some(init.clone());
        self.send(Control::Install(init))
    }

    fn add_buffer(&self, handle: TransportHandle) -> bool {
        if self.is_closed() {
            return false;
        }
        self.shared.table.insert(&handle);
        true
    }

    fn set_data_surface_buffer(&self, handle: TransportHandle) -> bool {
        self.send(Control::SetDataSurfaceBuffer(handle))
    }

    fn restart(&self) -> bool {
        self.send(Control::Restart)
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.shared.is_deactivated()
    }
}

impl Drop for LocalTranslator {
    fn drop(&mut self) {
        self.close();
    }
}
