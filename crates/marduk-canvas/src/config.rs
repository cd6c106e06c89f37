use std::time::Duration;

/// Tunables for recorders, translators and the replay texture registry.
///
/// Every field has a conservative default. [`CanvasConfig::from_env`] lets a
/// deployment override the values without a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasConfig {
    /// Upper bound on one `wait_for_replay_texture` call.
    pub replay_texture_timeout: Duration,

    /// Idle delay after an empty transaction before free transport buffers are
    /// released.
    pub drop_buffer_delay: Duration,

    /// Capacity of a regular transport buffer in bytes.
    ///
    /// Frames larger than this get a dedicated buffer sized to fit.
    pub default_buffer_size: usize,

    /// Number of transport buffers created up front.
    pub initial_buffer_count: usize,

    /// How long a translator waits for new frames before it stops and needs
    /// a restart from the writer.
    pub reader_idle_timeout: Duration,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            replay_texture_timeout: Duration::from_millis(10_000),
            drop_buffer_delay: Duration::from_millis(10_000),
            default_buffer_size: 64 * 1024,
            initial_buffer_count: 1,
            reader_idle_timeout: Duration::from_millis(50),
        }
    }
}

impl CanvasConfig {
    pub const TEXTURE_TIMEOUT_ENV: &'static str = "MARDUK_CANVAS_TEXTURE_TIMEOUT_MS";
    pub const DROP_BUFFER_ENV: &'static str = "MARDUK_CANVAS_DROP_BUFFER_MS";
    pub const BUFFER_SIZE_ENV: &'static str = "MARDUK_CANVAS_BUFFER_SIZE";
    pub const READER_IDLE_ENV: &'static str = "MARDUK_CANVAS_READER_IDLE_MS";

    /// Defaults overridden by the `MARDUK_CANVAS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, Self::TEXTURE_TIMEOUT_ENV) {
            config.replay_texture_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, Self::DROP_BUFFER_ENV) {
            config.drop_buffer_delay = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize, _>(&lookup, Self::BUFFER_SIZE_ENV) {
            if size >= MIN_BUFFER_SIZE {
                config.default_buffer_size = size;
            } else {
                log::warn!(
                    "{} = {size} is below the minimum of {MIN_BUFFER_SIZE} bytes; keeping {}",
                    Self::BUFFER_SIZE_ENV,
                    config.default_buffer_size
                );
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, Self::READER_IDLE_ENV) {
            config.reader_idle_timeout = Duration::from_millis(ms);
        }

        config
    }
}

/// Smallest accepted transport buffer. Anything smaller cannot hold a frame
/// header plus the trailing buffer switch.
pub const MIN_BUFFER_SIZE: usize = 256;

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring unparseable {key}={raw:?}; using default");
            None
        }
    }
}
