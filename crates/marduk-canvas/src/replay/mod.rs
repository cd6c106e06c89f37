//! In-process translator.
//!
//! Consumes a recorder's transport on a dedicated thread and replays it into
//! software BGRA/RGBA surfaces:
//! - draw target lifetime, fills and clears
//! - surface aliases
//! - readback into the producer's readback buffer
//! - presenting surfaces as replay textures through the registry
//!
//! Rasterization covers solid fills and clears.

mod raster;
mod translator;
mod worker;

pub use translator::{LocalTranslator, TextureOwner};
pub(crate) use worker::{mark_translator_thread, on_translator_thread};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::config::{CanvasConfig, MIN_BUFFER_SIZE};
    use crate::coords::{IntRect, IntSize, SurfaceFormat, TextureType};
    use crate::ids::ContentId;
    use crate::paint::Color;
    use crate::recorder::{Recorder, TranslatorChannel};
    use crate::registry::{HostAllocator, ReplayTextureRegistry};
    use crate::state::RemoteCanvasState;
    use crate::transport::SharedMemory;

    use super::*;

    const CONTENT: ContentId = ContentId(41);

    struct Compositor;

    impl HostAllocator for Compositor {
        fn content_id(&self) -> ContentId {
            CONTENT
        }
        fn ipc_open(&self) -> bool {
            true
        }
    }

    struct Fixture {
        registry: Arc<ReplayTextureRegistry>,
        translator: Arc<LocalTranslator>,
        recorder: Arc<Recorder>,
    }

    fn config() -> CanvasConfig {
        CanvasConfig {
            replay_texture_timeout: Duration::from_secs(2),
            reader_idle_timeout: Duration::from_millis(5),
            ..CanvasConfig::default()
        }
    }

    fn fixture_with(config: CanvasConfig, size: IntSize) -> Fixture {
        let state = Arc::new(RemoteCanvasState::new());
        let registry = Arc::new(ReplayTextureRegistry::new(state.clone(), config.replay_texture_timeout));
        let owner = TextureOwner { content_id: CONTENT, manager_id: 1 };
        let translator = LocalTranslator::spawn(owner, config.clone(), registry.clone(), state.clone()).unwrap();
        let recorder = Recorder::new(translator.clone(), config, state);
        assert!(recorder.ensure_recorder(size, SurfaceFormat::B8G8R8A8, TextureType::Shmem));
        Fixture { registry, translator, recorder }
    }

    fn fixture() -> Fixture {
        fixture_with(config(), IntSize::new(128, 128))
    }

    fn red() -> Color {
        Color::from_srgb_u8(255, 0, 0, 255)
    }

    fn green() -> Color {
        Color::from_srgb_u8(0, 255, 0, 255)
    }

    fn blue() -> Color {
        Color::from_srgb_u8(0, 0, 255, 255)
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    // ── readback ────────────────────────────────────────────────────────────

    #[test]
    fn readback_after_closed_transaction_sees_exactly_the_prior_draws() {
        let f = fixture();
        let size = IntSize::new(128, 128);
        let dt = f.recorder.create_draw_target(size, SurfaceFormat::B8G8R8A8).unwrap();

        assert!(f.recorder.begin_transaction_if_needed());
        let base = f.recorder.transport().unwrap().create_checkpoint();
        assert!(dt.fill_rect(IntRect::new(0, 0, 64, 64), red()));
        assert!(dt.fill_rect(IntRect::new(64, 0, 64, 64), green()));
        assert!(dt.fill_rect(IntRect::new(32, 32, 64, 64), blue()));
        f.recorder.end_transaction();
        assert!(!f.recorder.in_transaction());

        let data = f.recorder.get_data_surface(&dt.surface()).unwrap();

        // Reopened, then prepare + get appended after the three draws.
        assert!(f.recorder.in_transaction());
        let transport = f.recorder.transport().unwrap();
        assert_eq!(transport.create_checkpoint(), base + 5);
        assert!(transport.header().processed_count() >= base + 5);

        assert_eq!(data.size(), size);
        assert_eq!(data.stride(), 512);
        assert_eq!(data.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(data.pixel(127, 0), Some([0, 255, 0, 255]));
        assert_eq!(data.pixel(40, 40), Some([255, 0, 0, 255]));
        assert_eq!(data.pixel(95, 95), Some([255, 0, 0, 255]));
        assert_eq!(data.pixel(0, 127), Some([0, 0, 0, 0]));
        assert_eq!(data.pixel(127, 127), Some([0, 0, 0, 0]));
        assert_eq!(data.pixel(128, 0), None);
    }

    #[test]
    fn later_draws_do_not_leak_into_earlier_readback() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(8, 8), SurfaceFormat::B8G8R8A8)
            .unwrap();
        dt.fill_rect(IntRect::new(0, 0, 8, 8), red());
        let first = f.recorder.get_data_surface(&dt.surface()).unwrap().to_vec();

        dt.fill_rect(IntRect::new(0, 0, 8, 8), green());
        let second = f.recorder.get_data_surface(&dt.surface()).unwrap().to_vec();

        assert_eq!(&first[..4], &[0, 0, 255, 255]);
        assert_eq!(&second[..4], &[0, 255, 0, 255]);
    }

    #[test]
    fn readback_through_alias_resolves_to_target() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(4, 4), SurfaceFormat::B8G8R8A8)
            .unwrap();
        dt.fill_rect(IntRect::new(0, 0, 4, 4), blue());

        let aliased = f.recorder.wrap_surface(&dt.surface()).unwrap();
        let data = aliased.data_surface().unwrap();
        assert_eq!(data.pixel(3, 3), Some([255, 0, 0, 255]));
    }

    #[test]
    fn growing_transport_keeps_stream_intact() {
        let config = CanvasConfig {
            default_buffer_size: MIN_BUFFER_SIZE,
            ..config()
        };
        let f = fixture_with(config, IntSize::new(16, 16));
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(16, 16), SurfaceFormat::B8G8R8A8)
            .unwrap();

        f.recorder.begin_transaction_if_needed();
        for x in 0..16 {
            for y in 0..16 {
                let color = if (x + y) % 2 == 0 { red() } else { blue() };
                assert!(dt.fill_rect(IntRect::new(x, y, 1, 1), color));
            }
        }
        f.recorder.end_transaction();

        let data = f.recorder.get_data_surface(&dt.surface()).unwrap();
        assert_eq!(data.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(data.pixel(1, 0), Some([255, 0, 0, 255]));
        assert_eq!(data.pixel(15, 15), Some([0, 0, 255, 255]));
        assert!(f.recorder.stats().buffers_live > 1);
    }

    #[test]
    fn idle_translator_restarts_for_next_readback() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(2, 2), SurfaceFormat::B8G8R8A8)
            .unwrap();
        for color in [red(), green(), blue()] {
            // Long enough for the reader to stop between rounds.
            thread::sleep(Duration::from_millis(30));
            dt.fill_rect(IntRect::new(0, 0, 2, 2), color);
            let data = f.recorder.get_data_surface(&dt.surface()).unwrap();
            assert_eq!(data.pixel(1, 1), Some(color.to_pixel(SurfaceFormat::B8G8R8A8)));
        }
    }

    // ── replay textures ─────────────────────────────────────────────────────

    #[test]
    fn presented_texture_is_claimed_by_compositor() {
        let f = fixture();
        let size = IntSize::new(3, 2);
        let dt = f.recorder.create_draw_target(size, SurfaceFormat::B8G8R8A8).unwrap();
        dt.fill_rect(IntRect::new(0, 0, 3, 2), green());
        f.recorder.on_write_lock_taken();
        assert!(dt.present(11));
        assert!(f.recorder.on_handoff());

        let desc = f.registry.wait_for_replay_texture(&Compositor, 11).unwrap();
        assert_eq!(desc.size, size);
        assert_eq!(desc.texture_type, TextureType::Shmem);
        assert_eq!(desc.stride, 12);
        desc.handle.map().with_bytes(|bytes| {
            assert_eq!(&bytes[..4], &[0, 255, 0, 255]);
            assert_eq!(&bytes[20..24], &[0, 255, 0, 255]);
        });
        assert!(f.registry.is_empty());
    }

    #[test]
    fn released_texture_is_withdrawn() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(1, 1), SurfaceFormat::B8G8R8A8)
            .unwrap();
        dt.present(5);
        dt.present(6);
        dt.release_texture(5);
        let checkpoint = f.recorder.create_checkpoint().unwrap();
        assert!(f.recorder.wait_for_checkpoint(checkpoint));

        assert_eq!(f.registry.len(), 1);
        assert!(f.registry.wait_for_replay_texture(&Compositor, 6).is_some());
    }

    // ── teardown ────────────────────────────────────────────────────────────

    #[test]
    fn closing_translator_purges_textures_and_abandons_readback() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(1, 1), SurfaceFormat::B8G8R8A8)
            .unwrap();
        dt.present(1);
        let checkpoint = f.recorder.create_checkpoint().unwrap();
        assert!(f.recorder.wait_for_checkpoint(checkpoint));
        assert_eq!(f.registry.len(), 1);

        f.translator.close();
        assert!(f.translator.is_closed());
        assert!(f.registry.is_empty());
        assert!(f.recorder.get_data_surface(&dt.surface()).is_none());
    }

    #[test]
    fn readback_buffer_outside_pause_deactivates_translator() {
        let f = fixture();
        let checkpoint = f.recorder.create_checkpoint().unwrap();
        assert!(f.recorder.wait_for_checkpoint(checkpoint));

        let stray = SharedMemory::create(4096).unwrap();
        assert!(f.translator.set_data_surface_buffer(stray.handle()));
        assert!(wait_until(|| f.translator.is_deactivated()));
        assert!(f.translator.is_closed());
    }

    #[test]
    fn applied_event_count_tracks_stream() {
        let f = fixture();
        let dt = f
            .recorder
            .create_draw_target(IntSize::new(1, 1), SurfaceFormat::B8G8R8A8)
            .unwrap();
        dt.flush();
        dt.flush();
        let checkpoint = f.recorder.create_checkpoint().unwrap();
        assert!(f.recorder.wait_for_checkpoint(checkpoint));
        let written = f.recorder.stats().events_recorded as u64;
        assert!(wait_until(|| f.translator.events_applied() == written));
    }
}
