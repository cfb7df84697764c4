use std::path::Path;
use std::sync::Once;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

// Define log targets as constants
pub const PDF_PARSING: &str = "pdf_parse";
pub const PDF_TEXT_OBJECT: &str = "pdf_text_object";
pub const LAYOUT: &str = "layout";
pub const FEATURES: &str = "features";
pub const EXPORT: &str = "export";
pub const OCR: &str = "ocr";

pub const LOG_FILE_NAME: &str = "pdf-coords.log";

static INIT: Once = Once::new();

fn stdout_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default()
            .add_directive(default_level.into())
            // Per-operator tracing is only useful when asked for explicitly.
            .add_directive(
                format!("{}=info", PDF_TEXT_OBJECT)
                    .parse()
                    .unwrap_or_else(|_| default_level.into()),
            )
    })
}

/// Install a stdout subscriber. Keep the returned guard alive for as long
/// as log output is wanted; dropping it flushes the writer.
pub fn init_logging(verbose: bool) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(writer)
                    .with_filter(stdout_filter(verbose)),
            )
            .init();
    });

    guard
}

/// Like [`init_logging`], but also writes every debug-level event to
/// `LOG_FILE_NAME` inside `log_dir`.
pub fn init_logging_with_dir(verbose: bool, log_dir: &Path) -> Result<(WorkerGuard, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, LOG_FILE_NAME);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    INIT.call_once(|| {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(file_writer)
            .with_filter(EnvFilter::new("debug"));

        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(stdout_writer)
            .with_filter(stdout_filter(verbose));

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stdout_layer)
            .init();
    });

    Ok((stdout_guard, file_guard))
}
