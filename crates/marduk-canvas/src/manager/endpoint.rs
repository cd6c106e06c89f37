use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::error::ProtocolError;
use crate::ids::{ContentId, ManagerId, ProtocolId, RemoteTextureOwnerId};
use crate::registry::ReplayTextureOwner;
use crate::replay::{LocalTranslator, TextureOwner};
use crate::sync::lock;

use super::backend::{ActorKind, FrontBufferSnapshot, Side, SnapshotBackend};
use super::canvas_manager::ManagerShared;

/// Lifecycle of a manager endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Unbound,
    /// In the live set, waiting for `initialize`.
    Bound,
    Initialized,
    Destroyed,
}

#[derive(Clone)]
enum ManagedActor {
    Canvas(Arc<LocalTranslator>),
    WebGl(Arc<dyn SnapshotBackend>),
    WebGpu(Arc<dyn SnapshotBackend>),
}

impl ManagedActor {
    fn kind(&self) -> ActorKind {
        match self {
            ManagedActor::Canvas(_) => ActorKind::Canvas,
            ManagedActor::WebGl(_) => ActorKind::WebGl,
            ManagedActor::WebGpu(_) => ActorKind::WebGpu,
        }
    }

    fn side(&self) -> Side {
        match self {
            ManagedActor::Canvas(_) => Side::Parent,
            ManagedActor::WebGl(b) | ManagedActor::WebGpu(b) => b.side(),
        }
    }
}

struct EndpointInner {
    state: EndpointState,
    /// Zero until initialized.
    id: ManagerId,
    actors: BTreeMap<ProtocolId, ManagedActor>,
    next_protocol_id: ProtocolId,
}

/// One producer process's connection to the canvas manager.
///
/// Any protocol violation closes the endpoint; the error is returned to the
/// caller and the endpoint stays destroyed.
pub struct ManagerEndpoint {
    content_id: ContentId,
    shared: Weak<ManagerShared>,
    inner: Mutex<EndpointInner>,
}

impl ManagerEndpoint {
    pub(crate) fn new(content_id: ContentId, shared: Weak<ManagerShared>) -> Self {
        Self {
            content_id,
            shared,
            inner: Mutex::new(EndpointInner {
                state: EndpointState::Unbound,
                id: 0,
                actors: BTreeMap::new(),
                next_protocol_id: 1,
            }),
        }
    }

    #[inline]
    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    /// The producer-assigned id, zero before initialization.
    pub fn id(&self) -> ManagerId {
        lock(&self.inner).id
    }

    pub fn state(&self) -> EndpointState {
        lock(&self.inner).state
    }

    /// Unbound -> Bound. Runs on the render thread.
    pub(crate) fn bind(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != EndpointState::Unbound {
            return false;
        }
        inner.state = EndpointState::Bound;
        true
    }

    /// Assigns the endpoint's id. Legal once, after binding, with a non-zero id.
    pub fn initialize(self: &Arc<Self>, id: ManagerId) -> Result<(), ProtocolError> {
        let result = {
            let mut inner = lock(&self.inner);
            match inner.state {
                EndpointState::Destroyed => Err(ProtocolError::Closed),
                EndpointState::Unbound => Err(ProtocolError::NotBound),
                _ if id == 0 => Err(ProtocolError::InvalidId),
                EndpointState::Initialized => Err(ProtocolError::AlreadyInitialized),
                EndpointState::Bound => {
                    inner.id = id;
                    inner.state = EndpointState::Initialized;
                    Ok(())
                }
            }
        };
        if result.is_ok() {
            log::debug!("{}: manager endpoint initialized as {id}", self.content_id);
        }
        result.map_err(|e| self.fail(e))
    }

    fn require_initialized(&self) -> Result<ManagerId, ProtocolError> {
        let inner = lock(&self.inner);
        match inner.state {
            EndpointState::Initialized => Ok(inner.id),
            EndpointState::Destroyed => Err(ProtocolError::Closed),
            EndpointState::Unbound => Err(ProtocolError::NotBound),
            EndpointState::Bound => Err(ProtocolError::NotInitialized),
        }
    }

    fn register(&self, actor: ManagedActor) -> ProtocolId {
        let mut inner = lock(&self.inner);
        let protocol_id = inner.next_protocol_id;
        inner.next_protocol_id += 1;
        log::debug!("{}: {:?} actor {protocol_id} allocated", self.content_id, actor.kind());
        inner.actors.insert(protocol_id, actor);
        protocol_id
    }

    fn lookup(&self, protocol_id: ProtocolId) -> Option<ManagedActor> {
        lock(&self.inner).actors.get(&protocol_id).cloned()
    }

    /// Creates a translator for one of this producer's recorders.
    pub fn alloc_canvas_translator(self: &Arc<Self>) -> Result<Arc<LocalTranslator>, ProtocolError> {
        let manager_id = self.require_initialized().map_err(|e| self.fail(e))?;
        let shared = self.shared.upgrade().ok_or(ProtocolError::Closed)?;
        if shared.state.is_deactivated() {
            return Err(ProtocolError::RemoteCanvasDisabled);
        }

        let owner = TextureOwner {
            content_id: self.content_id,
            manager_id,
        };
        let translator = LocalTranslator::spawn(
            owner,
            shared.config.clone(),
            shared.registry.clone(),
            shared.state.clone(),
        )?;
        self.register(ManagedActor::Canvas(translator.clone()));
        Ok(translator)
    }

    pub fn alloc_webgl(self: &Arc<Self>, backend: Arc<dyn SnapshotBackend>) -> Result<ProtocolId, ProtocolError> {
        self.require_initialized().map_err(|e| self.fail(e))?;
        Ok(self.register(ManagedActor::WebGl(backend)))
    }

    pub fn alloc_webgpu(self: &Arc<Self>, backend: Arc<dyn SnapshotBackend>) -> Result<ProtocolId, ProtocolError> {
        self.require_initialized().map_err(|e| self.fail(e))?;
        Ok(self.register(ManagedActor::WebGpu(backend)))
    }

    /// Snapshots the front buffer of actor `protocol_id` under manager
    /// `manager_id` of this producer.
    ///
    /// `owner_id` is required for WebGPU actors. Anything else that does not
    /// match is a protocol violation.
    pub fn get_snapshot(
        self: &Arc<Self>,
        manager_id: ManagerId,
        protocol_id: ProtocolId,
        owner_id: Option<RemoteTextureOwnerId>,
    ) -> Result<FrontBufferSnapshot, ProtocolError> {
        self.snapshot(manager_id, protocol_id, owner_id)
            .map_err(|e| self.fail(e))
    }

    fn snapshot(
        &self,
        manager_id: ManagerId,
        protocol_id: ProtocolId,
        owner_id: Option<RemoteTextureOwnerId>,
    ) -> Result<FrontBufferSnapshot, ProtocolError> {
        self.require_initialized()?;
        if manager_id == 0 {
            return Err(ProtocolError::InvalidId);
        }
        let shared = self.shared.upgrade().ok_or(ProtocolError::Closed)?;

        let actor = shared
            .live_endpoints()
            .into_iter()
            .find(|e| e.content_id == self.content_id && e.id() == manager_id)
            .and_then(|e| e.lookup(protocol_id))
            .ok_or(ProtocolError::InvalidActor {
                manager_id,
                protocol_id,
            })?;

        if actor.side() != Side::Parent {
            return Err(ProtocolError::UnsupportedActor);
        }

        match actor {
            ManagedActor::WebGl(backend) => Ok(backend.front_buffer_snapshot(None)?),
            ManagedActor::WebGpu(backend) => {
                let owner = owner_id.ok_or(ProtocolError::InvalidOwnerId)?;
                Ok(backend.front_buffer_snapshot(Some(owner))?)
            }
            ManagedActor::Canvas(_) => Err(ProtocolError::UnsupportedProtocol),
        }
    }

    /// Closes the endpoint for protocol violations. Backend failures are
    /// reported without closing.
    fn fail(self: &Arc<Self>, error: ProtocolError) -> ProtocolError {
        match error {
            ProtocolError::Closed => {}
            ProtocolError::Snapshot(ref e) => {
                log::warn!("{}: front buffer snapshot failed: {e}", self.content_id);
            }
            _ => {
                log::error!("{}: protocol violation: {error}", self.content_id);
                self.destroy();
            }
        }
        error
    }

    /// Closes the endpoint on the render thread: leaves the live set, closes
    /// its translators and purges its replay textures. Idempotent.
    pub fn destroy(self: &Arc<Self>) {
        let Some(shared) = self.shared.upgrade() else {
            self.close_actors();
            return;
        };
        let this = self.clone();
        let owner = shared.clone();
        if shared
            .render_thread
            .dispatch_sync(move || this.close_on_owner(&owner))
            .is_none()
        {
            self.close_on_owner(&shared);
        }
    }

    pub(crate) fn close_on_owner(&self, shared: &ManagerShared) {
        if !self.close_actors() {
            return;
        }
        shared.remove_endpoint(self);
        let purged = shared.registry.remove_replay_textures(self);
        log::debug!("{}: manager endpoint destroyed, {purged} replay textures purged", self.content_id);
    }

    /// Marks the endpoint destroyed and closes its translators. `false` if
    /// it already was.
    fn close_actors(&self) -> bool {
        let actors = {
            let mut inner = lock(&self.inner);
            if inner.state == EndpointState::Destroyed {
                return false;
            }
            inner.state = EndpointState::Destroyed;
            std::mem::take(&mut inner.actors)
        };
        for actor in actors.into_values() {
            if let ManagedActor::Canvas(translator) = actor {
                translator.close();
            }
        }
        true
    }

    pub(crate) fn translators(&self) -> Vec<Arc<LocalTranslator>> {
        lock(&self.inner)
            .actors
            .values()
            .filter_map(|a| match a {
                ManagedActor::Canvas(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ReplayTextureOwner for ManagerEndpoint {
    fn content_id(&self) -> ContentId {
        self.content_id
    }

    fn manager_id(&self) -> ManagerId {
        self.id()
    }
}
