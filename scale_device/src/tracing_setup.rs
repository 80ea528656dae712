//! Tracing subscriber setup: console output (pretty or JSON) plus an
//! optional rolling file sink, mirroring the shape of the config's
//! `[logging]` table.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::FILE_GUARD;

fn rotation_from_str(s: &str) -> tracing_appender::rolling::Rotation {
    match s {
        "minutely" => tracing_appender::rolling::Rotation::MINUTELY,
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    }
}

/// Initialize the global tracing subscriber. `json` selects JSON console
/// output (used alongside `--json` structured stdout so logs and data never
/// interleave on the same stream); `log_level` seeds the default filter when
/// `RUST_LOG` is unset. `file`/`rotation` add a non-blocking rolling file
/// sink; its `WorkerGuard` is stashed in `cli::FILE_GUARD` so it lives for
/// the process lifetime and flushes on drop at exit.
pub fn init_tracing(json: bool, log_level: &str, file: Option<&str>, rotation: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = if json {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let registry = tracing_subscriber::registry().with(filter).with(console_layer);

    if let Some(path) = file {
        let path = std::path::Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or("scale_device.log");
        let rotation = rotation_from_str(rotation.unwrap_or("daily"));
        let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(false);
        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}
