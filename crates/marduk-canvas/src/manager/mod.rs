//! Process-wide canvas manager.
//!
//! Responsibilities:
//! - bind producer endpoints and track the live set
//! - allocate translators and snapshot-capable backends per endpoint
//! - route front-buffer snapshot requests, closing endpoints on violations
//! - process shutdown and global remote-canvas disable

mod backend;
mod canvas_manager;
mod endpoint;

pub use backend::{ActorKind, FrontBufferSnapshot, RemoteCanvasListener, Side, SnapshotBackend};
pub use canvas_manager::CanvasManager;
pub use endpoint::{EndpointState, ManagerEndpoint};

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::config::CanvasConfig;
    use crate::coords::{IntSize, SurfaceFormat, TextureType};
    use crate::error::{ProtocolError, SnapshotError};
    use crate::ids::{ContentId, RemoteTextureOwnerId};
    use crate::recorder::TranslatorChannel;
    use crate::registry::{HostAllocator, SurfaceDescriptor};
    use crate::state::RemoteCanvasState;
    use crate::transport::SharedMemory;

    use super::*;

    struct Backend {
        side: Side,
        fail: bool,
    }

    impl Backend {
        fn parent() -> Arc<dyn SnapshotBackend> {
            Arc::new(Self { side: Side::Parent, fail: false })
        }

        fn child() -> Arc<dyn SnapshotBackend> {
            Arc::new(Self { side: Side::Child, fail: false })
        }

        fn broken() -> Arc<dyn SnapshotBackend> {
            Arc::new(Self { side: Side::Parent, fail: true })
        }
    }

    impl SnapshotBackend for Backend {
        fn side(&self) -> Side {
            self.side
        }

        fn front_buffer_snapshot(
            &self,
            owner: Option<RemoteTextureOwnerId>,
        ) -> Result<FrontBufferSnapshot, SnapshotError> {
            if self.fail {
                return Err(SnapshotError::NoFrontBuffer);
            }
            // Tag the first pixel with the owner so tests can see it was passed.
            let tag = owner.map_or(0, |o| o.0 as u8);
            Ok(FrontBufferSnapshot {
                size: IntSize::new(1, 1),
                stride: 4,
                pixels: vec![tag, 0, 0, 255],
            })
        }
    }

    struct Compositor(ContentId);

    impl HostAllocator for Compositor {
        fn content_id(&self) -> ContentId {
            self.0
        }
        fn ipc_open(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct CountingListener(AtomicUsize);

    impl RemoteCanvasListener for CountingListener {
        fn remote_canvas_disabled(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager_with(listeners: Vec<Arc<dyn RemoteCanvasListener>>) -> CanvasManager {
        let config = CanvasConfig {
            replay_texture_timeout: Duration::from_secs(10),
            ..CanvasConfig::default()
        };
        CanvasManager::new(config, Arc::new(RemoteCanvasState::new()), listeners).unwrap()
    }

    fn manager() -> CanvasManager {
        manager_with(Vec::new())
    }

    fn ready(manager: &CanvasManager, content: u64, id: u32) -> Arc<ManagerEndpoint> {
        let endpoint = manager.init(ContentId(content)).unwrap();
        endpoint.initialize(id).unwrap();
        endpoint
    }

    fn desc() -> SurfaceDescriptor {
        SurfaceDescriptor {
            texture_type: TextureType::Shmem,
            size: IntSize::new(1, 1),
            format: SurfaceFormat::B8G8R8A8,
            stride: 4,
            handle: SharedMemory::create(4).unwrap().handle(),
        }
    }

    // ── endpoint lifecycle ──────────────────────────────────────────────────

    #[test]
    fn init_binds_and_initialize_assigns_id() {
        let manager = manager();
        let endpoint = manager.init(ContentId(1)).unwrap();
        assert_eq!(endpoint.state(), EndpointState::Bound);
        assert_eq!(endpoint.id(), 0);
        assert_eq!(manager.endpoint_count(), 1);

        endpoint.initialize(9).unwrap();
        assert_eq!(endpoint.state(), EndpointState::Initialized);
        assert_eq!(endpoint.id(), 9);
    }

    #[test]
    fn zero_id_closes_endpoint() {
        let manager = manager();
        let endpoint = manager.init(ContentId(1)).unwrap();
        assert_eq!(endpoint.initialize(0), Err(ProtocolError::InvalidId));
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
        assert_eq!(manager.endpoint_count(), 0);
        assert_eq!(endpoint.initialize(3), Err(ProtocolError::Closed));
    }

    #[test]
    fn second_initialize_closes_endpoint() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 4);
        assert_eq!(endpoint.initialize(5), Err(ProtocolError::AlreadyInitialized));
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
        assert_eq!(manager.endpoint_count(), 0);
    }

    #[test]
    fn allocation_before_initialize_closes_endpoint() {
        let manager = manager();
        let endpoint = manager.init(ContentId(1)).unwrap();
        assert_eq!(
            endpoint.alloc_webgl(Backend::parent()).err(),
            Some(ProtocolError::NotInitialized)
        );
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
        assert_eq!(
            endpoint.alloc_canvas_translator().err(),
            Some(ProtocolError::Closed)
        );
    }

    #[test]
    fn destroy_closes_translators_and_purges_textures() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let other = ready(&manager, 1, 3);
        let translator = endpoint.alloc_canvas_translator().unwrap();

        let registry = manager.registry();
        assert!(registry.add_replay_texture(&*endpoint, 10, desc()));
        assert!(registry.add_replay_texture(&*other, 11, desc()));

        endpoint.destroy();
        endpoint.destroy();
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
        assert!(translator.is_closed());
        assert_eq!(manager.endpoint_count(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.wait_for_replay_texture(&Compositor(ContentId(1)), 11).is_some());
    }

    // ── snapshots ───────────────────────────────────────────────────────────

    #[test]
    fn webgl_snapshot_is_served() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let actor = endpoint.alloc_webgl(Backend::parent()).unwrap();

        let snapshot = endpoint.get_snapshot(2, actor, None).unwrap();
        assert_eq!(snapshot.size, IntSize::new(1, 1));
        assert_eq!(snapshot.pixels, vec![0, 0, 0, 255]);
        assert_eq!(endpoint.state(), EndpointState::Initialized);
    }

    #[test]
    fn snapshot_resolves_sibling_endpoint_of_same_producer() {
        let manager = manager();
        let gl = ready(&manager, 1, 2);
        let actor = gl.alloc_webgl(Backend::parent()).unwrap();
        let sibling = ready(&manager, 1, 3);
        let stranger = ready(&manager, 7, 2);

        assert!(sibling.get_snapshot(2, actor, None).is_ok());
        assert_eq!(
            stranger.get_snapshot(2, actor, None).err(),
            Some(ProtocolError::InvalidActor { manager_id: 2, protocol_id: actor })
        );
        assert_eq!(stranger.state(), EndpointState::Destroyed);
    }

    #[test]
    fn webgpu_snapshot_requires_owner() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let actor = endpoint.alloc_webgpu(Backend::parent()).unwrap();

        let snapshot = endpoint
            .get_snapshot(2, actor, Some(RemoteTextureOwnerId(5)))
            .unwrap();
        assert_eq!(snapshot.pixels[0], 5);

        assert_eq!(
            endpoint.get_snapshot(2, actor, None).err(),
            Some(ProtocolError::InvalidOwnerId)
        );
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
    }

    #[test]
    fn child_side_actor_is_unsupported() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let actor = endpoint.alloc_webgl(Backend::child()).unwrap();
        assert_eq!(
            endpoint.get_snapshot(2, actor, None).err(),
            Some(ProtocolError::UnsupportedActor)
        );
    }

    #[test]
    fn canvas_actor_has_no_snapshot_protocol() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        endpoint.alloc_canvas_translator().unwrap();
        assert_eq!(
            endpoint.get_snapshot(2, 1, None).err(),
            Some(ProtocolError::UnsupportedProtocol)
        );
    }

    #[test]
    fn unknown_actor_or_zero_manager_closes_endpoint() {
        let manager = manager();
        let a = ready(&manager, 1, 2);
        assert_eq!(
            a.get_snapshot(2, 99, None).err(),
            Some(ProtocolError::InvalidActor { manager_id: 2, protocol_id: 99 })
        );
        assert_eq!(a.state(), EndpointState::Destroyed);

        let b = ready(&manager, 1, 3);
        let actor = b.alloc_webgl(Backend::parent()).unwrap();
        assert_eq!(b.get_snapshot(0, actor, None).err(), Some(ProtocolError::InvalidId));
        assert_eq!(b.state(), EndpointState::Destroyed);
    }

    #[test]
    fn failed_backend_keeps_endpoint_open() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let actor = endpoint.alloc_webgl(Backend::broken()).unwrap();
        assert_eq!(
            endpoint.get_snapshot(2, actor, None).err(),
            Some(ProtocolError::Snapshot(SnapshotError::NoFrontBuffer))
        );
        assert_eq!(endpoint.state(), EndpointState::Initialized);
    }

    // ── shutdown / disable ──────────────────────────────────────────────────

    fn spawn_waiter(manager: &CanvasManager, content: u64) -> thread::JoinHandle<(bool, Duration)> {
        let registry = manager.registry().clone();
        thread::spawn(move || {
            let start = Instant::now();
            let got = registry.wait_for_replay_texture(&Compositor(ContentId(content)), 77);
            (got.is_some(), start.elapsed())
        })
    }

    #[test]
    fn shutdown_closes_everything_and_wakes_waiters() {
        let manager = manager();
        let endpoint = ready(&manager, 1, 2);
        let translator = endpoint.alloc_canvas_translator().unwrap();
        let waiter = spawn_waiter(&manager, 1);
        thread::sleep(Duration::from_millis(20));

        manager.shutdown();
        manager.shutdown();

        let (got, waited) = waiter.join().unwrap();
        assert!(!got);
        assert!(waited < Duration::from_secs(5));
        assert!(manager.is_shut_down());
        assert_eq!(manager.endpoint_count(), 0);
        assert_eq!(endpoint.state(), EndpointState::Destroyed);
        assert!(translator.is_closed());
        assert!(!manager.registry().is_enabled());
        assert_eq!(manager.init(ContentId(2)).err(), Some(ProtocolError::Closed));
    }

    #[test]
    fn disable_deactivates_translators_and_notifies_once() {
        let listener = Arc::new(CountingListener::default());
        let manager = manager_with(vec![listener.clone() as Arc<dyn RemoteCanvasListener>]);
        let endpoint = ready(&manager, 1, 2);
        let translator = endpoint.alloc_canvas_translator().unwrap();
        let waiter = spawn_waiter(&manager, 1);
        thread::sleep(Duration::from_millis(20));

        manager.disable_remote_canvas();
        manager.disable_remote_canvas();

        let (got, waited) = waiter.join().unwrap();
        assert!(!got);
        assert!(waited < Duration::from_secs(5));
        assert!(translator.is_deactivated());
        assert!(manager.state().is_deactivated());
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            endpoint.alloc_canvas_translator().err(),
            Some(ProtocolError::RemoteCanvasDisabled)
        );
        // Disable is not a violation of this endpoint.
        assert_eq!(endpoint.state(), EndpointState::Initialized);
    }
}
