use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "marduk_canvas::transport=trace,marduk_canvas=debug").
///
/// `write_style` controls ANSI coloring behavior.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Prefix each record with the emitting thread name. Useful when following
    /// a recorder and its translator side by side.
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            thread_names: true,
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Subsequent calls are ignored, so tests may call this freely.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }

        builder.write_style(config.write_style);

        if config.thread_names {
            builder.format(|buf, record| {
                use std::io::Write;
                let thread = std::thread::current();
                writeln!(
                    buf,
                    "[{} {:<5} {} {}] {}",
                    buf.timestamp_millis(),
                    record.level(),
                    thread.name().unwrap_or("<unnamed>"),
                    record.target(),
                    record.args()
                )
            });
        }

        // `try_init` so a test harness that already installed a logger is not fatal.
        if builder.try_init().is_err() {
            return;
        }

        log::debug!("logging initialized");
    });
}
