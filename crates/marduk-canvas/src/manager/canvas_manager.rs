use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CanvasConfig;
use crate::error::{ProtocolError, TransportError};
use crate::ids::{ContentId, TextureId};
use crate::registry::{HostAllocator, ReplayTextureRegistry, SurfaceDescriptor};
use crate::render_thread::RenderThread;
use crate::replay::on_translator_thread;
use crate::state::RemoteCanvasState;
use crate::sync::lock;

use super::backend::RemoteCanvasListener;
use super::endpoint::ManagerEndpoint;

/// State reachable from endpoints and render-thread tasks.
pub(crate) struct ManagerShared {
    pub(crate) config: CanvasConfig,
    pub(crate) state: Arc<RemoteCanvasState>,
    pub(crate) registry: Arc<ReplayTextureRegistry>,
    pub(crate) render_thread: RenderThread,
    /// Written only on the render thread.
    endpoints: Mutex<Vec<Arc<ManagerEndpoint>>>,
    listeners: Vec<Arc<dyn RemoteCanvasListener>>,
    shut_down: AtomicBool,
}

impl ManagerShared {
    /// Copy of the live set, safe to iterate while endpoints close.
    pub(crate) fn live_endpoints(&self) -> Vec<Arc<ManagerEndpoint>> {
        lock(&self.endpoints).clone()
    }

    pub(crate) fn remove_endpoint(&self, endpoint: &ManagerEndpoint) {
        lock(&self.endpoints).retain(|e| !std::ptr::eq(Arc::as_ptr(e), endpoint));
    }

    fn bind(&self, endpoint: Arc<ManagerEndpoint>) -> bool {
        if self.shut_down.load(Ordering::Acquire) || !endpoint.bind() {
            return false;
        }
        lock(&self.endpoints).push(endpoint);
        true
    }

    fn shutdown_on_owner(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            log::debug!("canvas manager already shut down");
            return;
        }
        let endpoints = self.live_endpoints();
        for endpoint in &endpoints {
            endpoint.close_on_owner(self);
        }
        self.registry.disable();
        log::info!("canvas manager shut down, {} endpoints closed", endpoints.len());
    }

    fn disable_on_owner(&self) {
        let translators: Vec<_> = self
            .live_endpoints()
            .iter()
            .flat_map(|e| e.translators())
            .collect();

        self.registry.disable();
        for translator in &translators {
            translator.deactivate();
        }
        self.registry.clear_and_notify();
        log::info!("remote canvas disabled, {} translators deactivated", translators.len());
    }
}

/// Per-process owner of the replay texture registry and of every manager
/// endpoint.
///
/// Endpoint lifecycle, shutdown and disable run on a dedicated render
/// thread so the live-endpoint set has one writer.
pub struct CanvasManager {
    shared: Arc<ManagerShared>,
}

impl CanvasManager {
    pub fn new(
        config: CanvasConfig,
        state: Arc<RemoteCanvasState>,
        listeners: Vec<Arc<dyn RemoteCanvasListener>>,
    ) -> Result<Self, TransportError> {
        let registry = Arc::new(ReplayTextureRegistry::new(
            state.clone(),
            config.replay_texture_timeout,
        ));
        let render_thread = RenderThread::spawn("canvas-render")?;
        Ok(Self {
            shared: Arc::new(ManagerShared {
                config,
                state,
                registry,
                render_thread,
                endpoints: Mutex::new(Vec::new()),
                listeners,
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ReplayTextureRegistry> {
        &self.shared.registry
    }

    #[inline]
    pub fn state(&self) -> &Arc<RemoteCanvasState> {
        &self.shared.state
    }

    #[inline]
    pub fn config(&self) -> &CanvasConfig {
        &self.shared.config
    }

    pub fn endpoint_count(&self) -> usize {
        lock(&self.shared.endpoints).len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Creates an endpoint for `content_id` and binds it on the render thread.
    pub fn init(&self, content_id: ContentId) -> Result<Arc<ManagerEndpoint>, ProtocolError> {
        let endpoint = Arc::new(ManagerEndpoint::new(content_id, Arc::downgrade(&self.shared)));
        let shared = self.shared.clone();
        let bound = endpoint.clone();
        match self.shared.render_thread.dispatch_sync(move || shared.bind(bound)) {
            Some(true) => {
                log::debug!("{content_id}: manager endpoint bound");
                Ok(endpoint)
            }
            _ => {
                log::warn!("{content_id}: manager endpoint not bound, manager is shut down");
                Err(ProtocolError::Closed)
            }
        }
    }

    /// Closes every endpoint, then empties the registry and wakes its
    /// waiters. Blocks until done; later calls do nothing.
    pub fn shutdown(&self) {
        let shared = self.shared.clone();
        if self
            .shared
            .render_thread
            .dispatch_sync(move || shared.shutdown_on_owner())
            .is_none()
        {
            self.shared.shutdown_on_owner();
        }
    }

    /// Turns remote canvas off for the whole process.
    ///
    /// Sets the sticky deactivation flag, tells the listeners, deactivates
    /// every translator and wakes everyone waiting for a replay texture.
    pub fn disable_remote_canvas(&self) {
        if self.shared.state.deactivate() {
            for listener in &self.shared.listeners {
                listener.remote_canvas_disabled();
            }
        }
        let shared = self.shared.clone();
        if self
            .shared
            .render_thread
            .dispatch_sync(move || shared.disable_on_owner())
            .is_none()
        {
            self.shared.disable_on_owner();
        }
    }

    /// Claims a replay texture for `allocator`'s producer.
    ///
    /// Refused on translator threads, which deposit the textures, and on the
    /// render thread, which runs the endpoint work those translators depend on.
    pub fn wait_for_replay_texture(
        &self,
        allocator: &dyn HostAllocator,
        texture_id: TextureId,
    ) -> Option<SurfaceDescriptor> {
        if on_translator_thread() {
            log::error!("replay texture {texture_id} waited for on a translator thread");
            return None;
        }
        if self.shared.render_thread.is_current() {
            log::error!("replay texture {texture_id} waited for on the render thread");
            return None;
        }
        self.shared.registry.wait_for_replay_texture(allocator, texture_id)
    }
}
