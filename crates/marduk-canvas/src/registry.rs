//! Rendezvous for replay textures.
//!
//! Translators deposit textures they produced on a producer's behalf; the
//! producer's compositor side claims each one exactly once. Entries are keyed
//! by `(content id, texture id)` and tagged with the depositing manager so a
//! torn-down endpoint can purge what it left behind.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::coords::{IntSize, SurfaceFormat, TextureType};
use crate::ids::{ContentId, ManagerId, TextureId};
use crate::state::RemoteCanvasState;
use crate::sync::lock;
use crate::transport::TransportHandle;

/// Serialized handle to a produced texture.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDescriptor {
    pub texture_type: TextureType,
    pub size: IntSize,
    pub format: SurfaceFormat,
    pub stride: usize,
    pub handle: TransportHandle,
}

/// Something that deposits replay textures (a translator).
pub trait ReplayTextureOwner {
    fn content_id(&self) -> ContentId;
    fn manager_id(&self) -> ManagerId;
}

/// The claiming side's connection to the producing process.
pub trait HostAllocator {
    fn content_id(&self) -> ContentId;
    /// `false` once the producing process is gone.
    fn ipc_open(&self) -> bool;
}

#[derive(Debug)]
struct ReplayTexture {
    desc: SurfaceDescriptor,
    content_id: ContentId,
    texture_id: TextureId,
    manager_id: ManagerId,
}

#[derive(Debug)]
struct Textures {
    entries: Vec<ReplayTexture>,
    enabled: bool,
}

impl Textures {
    /// Newest entries are the likeliest match, so scan from the back.
    fn position(&self, content_id: ContentId, texture_id: TextureId) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|t| t.content_id == content_id && t.texture_id == texture_id)
    }

    fn position_for(&self, owner: &dyn ReplayTextureOwner, texture_id: TextureId) -> Option<usize> {
        let (content_id, manager_id) = (owner.content_id(), owner.manager_id());
        self.entries.iter().rposition(|t| {
            t.content_id == content_id && t.texture_id == texture_id && t.manager_id == manager_id
        })
    }

    fn take(&mut self, content_id: ContentId, texture_id: TextureId) -> Option<SurfaceDescriptor> {
        let i = self.position(content_id, texture_id)?;
        Some(self.entries.remove(i).desc)
    }
}

/// Process-wide store of pending replay textures, guarded by one monitor.
#[derive(Debug)]
pub struct ReplayTextureRegistry {
    state: Arc<RemoteCanvasState>,
    timeout: Duration,
    textures: Mutex<Textures>,
    changed: Condvar,
}

impl ReplayTextureRegistry {
    pub fn new(state: Arc<RemoteCanvasState>, timeout: Duration) -> Self {
        Self {
            state,
            timeout,
            textures: Mutex::new(Textures {
                entries: Vec::new(),
                enabled: true,
            }),
            changed: Condvar::new(),
        }
    }

    /// Deposits a texture and wakes every waiter.
    ///
    /// An unclaimed entry from the same manager under the same texture id is
    /// replaced. Entries from other managers stay, and a claim takes the
    /// newest. Returns `false` (dropping `desc`) once disabled.
    pub fn add_replay_texture(
        &self,
        owner: &dyn ReplayTextureOwner,
        texture_id: TextureId,
        desc: SurfaceDescriptor,
    ) -> bool {
        let content_id = owner.content_id();
        let mut textures = lock(&self.textures);
        if !textures.enabled || self.state.is_deactivated() {
            log::debug!("dropping replay texture {texture_id} for {content_id}: disabled");
            return false;
        }

        if let Some(i) = textures.position_for(owner, texture_id) {
            log::warn!("replay texture {texture_id} for {content_id} replaced before it was claimed");
            textures.entries.remove(i);
        }

        textures.entries.push(ReplayTexture {
            desc,
            content_id,
            texture_id,
            manager_id: owner.manager_id(),
        });
        log::trace!("replay texture {texture_id} for {content_id} ready");
        self.changed.notify_all();
        true
    }

    /// Withdraws one unclaimed texture. Returns whether it was present.
    pub fn remove_replay_texture(&self, owner: &dyn ReplayTextureOwner, texture_id: TextureId) -> bool {
        let mut textures = lock(&self.textures);
        let Some(i) = textures
            .position_for(owner, texture_id)
            .or_else(|| textures.position(owner.content_id(), texture_id))
        else {
            return false;
        };
        let entry = textures.entries.remove(i);
        if entry.manager_id != owner.manager_id() {
            log::warn!(
                "replay texture {texture_id} removed by manager {} but deposited by {}",
                owner.manager_id(),
                entry.manager_id
            );
        }
        true
    }

    /// Purges everything `owner` deposited. Returns how many entries went.
    pub fn remove_replay_textures(&self, owner: &dyn ReplayTextureOwner) -> usize {
        let content_id = owner.content_id();
        let manager_id = owner.manager_id();
        let mut textures = lock(&self.textures);
        let before = textures.entries.len();
        textures
            .entries
            .retain(|t| !(t.content_id == content_id && t.manager_id == manager_id));
        before - textures.entries.len()
    }

    /// Blocks until the texture for `(allocator's content id, texture_id)`
    /// arrives and claims it.
    ///
    /// Returns `None` when remote canvas is disabled, the allocator's
    /// connection closes, or the configured timeout passes. Every wake
    /// re-checks all of these.
    pub fn wait_for_replay_texture(
        &self,
        allocator: &dyn HostAllocator,
        texture_id: TextureId,
    ) -> Option<SurfaceDescriptor> {
        let content_id = allocator.content_id();
        let deadline = Instant::now() + self.timeout;
        let mut textures = lock(&self.textures);

        loop {
            if let Some(desc) = textures.take(content_id, texture_id) {
                return Some(desc);
            }

            if !textures.enabled || self.state.is_deactivated() {
                log::warn!("replay texture {texture_id} for {content_id}: remote canvas disabled");
                return None;
            }
            if !allocator.ipc_open() {
                log::warn!("replay texture {texture_id} for {content_id}: producer gone");
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("replay texture {texture_id} for {content_id}: timed out");
                return None;
            }

            textures = self.wait(textures, deadline - now);
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Textures>, timeout: Duration) -> MutexGuard<'a, Textures> {
        self.changed
            .wait_timeout(guard, timeout)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|e| PoisonError::into_inner(e).0)
    }

    /// Drops every entry and wakes every waiter.
    pub fn clear_and_notify(&self) {
        let mut textures = lock(&self.textures);
        textures.entries.clear();
        self.changed.notify_all();
    }

    /// Refuses further deposits, drops every entry and wakes every waiter.
    /// Sticky.
    pub fn disable(&self) {
        let mut textures = lock(&self.textures);
        textures.enabled = false;
        textures.entries.clear();
        self.changed.notify_all();
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.textures).enabled
    }

    pub fn len(&self) -> usize {
        lock(&self.textures).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use crate::transport::SharedMemory;

    use super::*;

    struct Owner(ContentId, ManagerId);

    impl ReplayTextureOwner for Owner {
        fn content_id(&self) -> ContentId {
            self.0
        }
        fn manager_id(&self) -> ManagerId {
            self.1
        }
    }

    struct Allocator {
        content_id: ContentId,
        open: AtomicBool,
    }

    impl Allocator {
        fn new(content_id: u64) -> Self {
            Self {
                content_id: ContentId(content_id),
                open: AtomicBool::new(true),
            }
        }
    }

    impl HostAllocator for Allocator {
        fn content_id(&self) -> ContentId {
            self.content_id
        }
        fn ipc_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }
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

    fn registry(timeout_ms: u64) -> Arc<ReplayTextureRegistry> {
        Arc::new(ReplayTextureRegistry::new(
            Arc::new(RemoteCanvasState::new()),
            Duration::from_millis(timeout_ms),
        ))
    }

    // ── claims ──────────────────────────────────────────────────────────

    #[test]
    fn claim_returns_exact_descriptor_once() {
        let registry = registry(50);
        let d = desc();
        assert!(registry.add_replay_texture(&Owner(ContentId(1), 7), 3, d.clone()));

        let alloc = Allocator::new(1);
        assert_eq!(registry.wait_for_replay_texture(&alloc, 3), Some(d));
        assert_eq!(registry.wait_for_replay_texture(&alloc, 3), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn colliding_texture_ids_stay_with_their_content() {
        let registry = registry(30);
        let a = desc();
        let b = desc();
        registry.add_replay_texture(&Owner(ContentId(1), 1), 5, a.clone());
        registry.add_replay_texture(&Owner(ContentId(2), 1), 5, b.clone());

        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(2), 5), Some(b));
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(3), 5), None);
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(1), 5), Some(a));
    }

    #[test]
    fn waiter_is_woken_by_late_deposit() {
        let registry = registry(5_000);
        let d = desc();

        let r = registry.clone();
        let waiter = thread::spawn(move || r.wait_for_replay_texture(&Allocator::new(9), 1));

        thread::sleep(Duration::from_millis(20));
        registry.add_replay_texture(&Owner(ContentId(9), 2), 1, d.clone());
        assert_eq!(waiter.join().unwrap(), Some(d));
    }

    #[test]
    fn same_id_from_two_managers_keeps_both() {
        let registry = registry(30);
        let first = Owner(ContentId(1), 1);
        let second = Owner(ContentId(1), 2);
        let older = desc();
        let newer = desc();
        assert!(registry.add_replay_texture(&first, 7, older.clone()));
        assert!(registry.add_replay_texture(&second, 7, newer.clone()));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.remove_replay_textures(&first), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(1), 7), Some(newer));
    }

    #[test]
    fn claim_takes_newest_of_same_id() {
        let registry = registry(30);
        let older = desc();
        let newer = desc();
        registry.add_replay_texture(&Owner(ContentId(1), 1), 7, older.clone());
        registry.add_replay_texture(&Owner(ContentId(1), 2), 7, newer.clone());

        let alloc = Allocator::new(1);
        assert_eq!(registry.wait_for_replay_texture(&alloc, 7), Some(newer));
        assert_eq!(registry.wait_for_replay_texture(&alloc, 7), Some(older));
    }

    #[test]
    fn single_removal_prefers_own_entry() {
        let registry = registry(30);
        let first = Owner(ContentId(1), 1);
        let older = desc();
        registry.add_replay_texture(&first, 7, older.clone());
        registry.add_replay_texture(&Owner(ContentId(1), 2), 7, desc());

        assert!(registry.remove_replay_texture(&Owner(ContentId(1), 2), 7));
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(1), 7), Some(older));
    }

    #[test]
    fn duplicate_deposit_replaces_entry() {
        let registry = registry(30);
        let owner = Owner(ContentId(1), 1);
        let newer = desc();
        registry.add_replay_texture(&owner, 1, desc());
        registry.add_replay_texture(&owner, 1, newer.clone());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(1), 1), Some(newer));
    }

    // ── removal ─────────────────────────────────────────────────────────

    #[test]
    fn single_removal_targets_one_entry() {
        let registry = registry(30);
        let owner = Owner(ContentId(1), 1);
        registry.add_replay_texture(&owner, 1, desc());
        registry.add_replay_texture(&owner, 2, desc());

        assert!(registry.remove_replay_texture(&owner, 1));
        assert!(!registry.remove_replay_texture(&owner, 1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn bulk_removal_is_scoped_to_owner() {
        let registry = registry(30);
        let gone = Owner(ContentId(1), 1);
        let same_content = Owner(ContentId(1), 2);
        let same_manager = Owner(ContentId(2), 1);

        let writers: Vec<_> = [(1u64, 1u32), (1, 2), (2, 1)]
            .into_iter()
            .map(|(c, m)| {
                let r = registry.clone();
                thread::spawn(move || {
                    for id in 0..50 {
                        r.add_replay_texture(&Owner(ContentId(c), m), id, desc());
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(registry.remove_replay_textures(&gone), 50);
        assert_eq!(registry.len(), 100);
        assert_eq!(registry.remove_replay_textures(&gone), 0);
        assert_eq!(registry.remove_replay_textures(&same_content), 50);
        assert_eq!(registry.remove_replay_textures(&same_manager), 50);
    }

    // ── liveness ────────────────────────────────────────────────────────

    #[test]
    fn wait_times_out() {
        let registry = registry(30);
        let start = Instant::now();
        assert_eq!(registry.wait_for_replay_texture(&Allocator::new(1), 1), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn closed_allocator_fails_fast() {
        let registry = registry(5_000);
        let alloc = Allocator::new(1);
        alloc.open.store(false, Ordering::Release);
        let start = Instant::now();
        assert_eq!(registry.wait_for_replay_texture(&alloc, 1), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn disable_wakes_blocked_waiter() {
        let registry = registry(10_000);
        let r = registry.clone();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            (r.wait_for_replay_texture(&Allocator::new(1), 1), start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        registry.disable();
        let (result, waited) = waiter.join().unwrap();
        assert_eq!(result, None);
        assert!(waited < Duration::from_secs(2));

        assert!(!registry.is_enabled());
        assert!(!registry.add_replay_texture(&Owner(ContentId(1), 1), 1, desc()));
    }

    #[test]
    fn clear_empties_and_keeps_enabled() {
        let registry = registry(30);
        registry.add_replay_texture(&Owner(ContentId(1), 1), 1, desc());
        registry.clear_and_notify();
        assert!(registry.is_empty());
        assert!(registry.is_enabled());
    }
}
