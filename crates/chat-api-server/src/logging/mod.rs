//! Tracing subscriber setup: stdout plus optional daily-rotated files.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,chat_api_server=debug";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop, so `main` must keep it
/// alive for the lifetime of the process.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;
    let json = config.format.eq_ignore_ascii_case("json");

    let stdout_layer = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer().pretty().with_target(true).boxed()
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("chat-api")
                .filename_suffix("log")
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = if json {
                fmt::layer().json().with_writer(writer).with_target(true).boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
