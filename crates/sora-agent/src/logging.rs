//! Tracing subscriber setup.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Rolling log files are named `sora-agent.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "sora-agent.log";

const CRATES: [&str; 4] = ["sora_agent", "sora_core", "sora_platform_linux", "sora_platform_win"];

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
}

/// Filter applied when `RUST_LOG` is unset: our crates at `level`,
/// everything else at `warn`.
pub fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|c| format!("{c}={level}")));
    directives.join(",")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop and must live until
/// shutdown.
pub fn init(options: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&options.level)))?;

    let (file_layer, guard) = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if options.json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(guard)
}
