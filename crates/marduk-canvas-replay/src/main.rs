use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use marduk_canvas::coords::{IntRect, IntSize, SurfaceFormat, TextureType};
use marduk_canvas::ids::ContentId;
use marduk_canvas::logging::{LoggingConfig, init_logging};
use marduk_canvas::paint::Color;
use marduk_canvas::recorder::DataSurface;
use marduk_canvas::registry::HostAllocator;
use marduk_canvas::{CanvasConfig, CanvasManager, Recorder, RemoteCanvasState};

const CONTENT: ContentId = ContentId(1);
const MANAGER_ID: u32 = 1;
const TEXTURE_ID: i64 = 1;
const CANVAS: IntSize = IntSize { width: 256, height: 256 };

/// Compositor side of the demo: claims replay textures for one producer.
struct Compositor;

impl HostAllocator for Compositor {
    fn content_id(&self) -> ContentId {
        CONTENT
    }

    fn ipc_open(&self) -> bool {
        true
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let output = std::env::args_os().nth(1).map(PathBuf::from);
    let config = CanvasConfig::from_env();
    log::info!("starting with {config:?}");

    let state = Arc::new(RemoteCanvasState::new());
    let manager = CanvasManager::new(config.clone(), state.clone(), Vec::new())
        .context("failed to start canvas manager")?;

    let result = run(&manager, config, state, output);
    manager.shutdown();
    result
}

fn run(
    manager: &CanvasManager,
    config: CanvasConfig,
    state: Arc<RemoteCanvasState>,
    output: Option<PathBuf>,
) -> Result<()> {
    let endpoint = manager.init(CONTENT).context("failed to bind manager endpoint")?;
    endpoint
        .initialize(MANAGER_ID)
        .context("failed to initialize manager endpoint")?;
    let translator = endpoint
        .alloc_canvas_translator()
        .context("failed to allocate translator")?;

    let recorder = Recorder::new(translator.clone(), config, state);
    if !recorder.ensure_recorder(CANVAS, SurfaceFormat::B8G8R8A8, TextureType::Shmem) {
        bail!("remote canvas is unavailable");
    }
    let target = recorder
        .create_draw_target(CANVAS, SurfaceFormat::B8G8R8A8)
        .ok_or_else(|| anyhow!("failed to create draw target"))?;

    recorder.begin_transaction_if_needed();
    target.clear(IntRect::from_size(CANVAS));
    target.fill_rect(IntRect::new(0, 0, 256, 256), Color::from_srgb_u8(24, 24, 32, 255));
    target.fill_rect(IntRect::new(32, 32, 128, 128), Color::from_srgb_u8(220, 60, 40, 255));
    target.fill_rect(IntRect::new(96, 96, 128, 128), Color::from_srgb_u8(40, 120, 220, 160));
    recorder.end_transaction();

    let data = recorder
        .get_data_surface(&target.surface())
        .ok_or_else(|| anyhow!("readback failed"))?;
    log::info!(
        "read back {}x{} surface, centre pixel {:?}",
        data.size().width,
        data.size().height,
        data.pixel(128, 128)
    );

    recorder.on_write_lock_taken();
    target.present(TEXTURE_ID);
    if !recorder.on_handoff() {
        bail!("handoff to compositor failed");
    }
    let texture = manager
        .wait_for_replay_texture(&Compositor, TEXTURE_ID)
        .ok_or_else(|| anyhow!("replay texture {TEXTURE_ID} never arrived"))?;
    log::info!(
        "compositor claimed texture {TEXTURE_ID}: {}x{} {:?}, {} byte buffer",
        texture.size.width,
        texture.size.height,
        texture.format,
        texture.handle.size()
    );

    if let Some(path) = output {
        save_png(&data, &path).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }

    let stats = recorder.stats();
    log::info!(
        "recorded {} events, {} checkpoints, {} translated",
        stats.events_recorded,
        stats.checkpoints_created,
        translator.events_applied()
    );
    Ok(())
}

fn save_png(data: &DataSurface, path: &Path) -> Result<()> {
    let size = data.size();
    let (width, height) = (size.width as usize, size.height as usize);
    let stride = data.stride();
    let bgra = match data.format() {
        SurfaceFormat::B8G8R8A8 | SurfaceFormat::B8G8R8X8 => true,
        SurfaceFormat::R8G8B8A8 => false,
        other => bail!("cannot encode {other:?} surfaces"),
    };

    let mut rgba = Vec::with_capacity(width * height * 4);
    data.with_data(|bytes| {
        for row in bytes.chunks(stride).take(height) {
            for px in row[..width * 4].chunks_exact(4) {
                if bgra {
                    rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                } else {
                    rgba.extend_from_slice(px);
                }
            }
        }
    });

    let image = image::RgbaImage::from_raw(size.width as u32, size.height as u32, rgba)
        .ok_or_else(|| anyhow!("readback buffer is smaller than the surface"))?;
    image.save(path)?;
    Ok(())
}
