use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes tracing with a console layer and a rolling JSON file layer.
///
/// Diagnostics default to `info` for this crate; per-line parser decisions
/// are `debug` events enabled through `RUST_LOG`.
pub fn init_logging() {
    // The daily appender needs its target directory up front
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "dimm_scout.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Machine-readable log file, human-readable console on stderr so that
    // report output on stdout stays clean
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("dimm_scout=info".parse().unwrap()))
        .with(file_layer)
        .with(console_layer)
        .init();

    // The appender guard must outlive main for logs to flush on exit
    std::mem::forget(_guard);
}
