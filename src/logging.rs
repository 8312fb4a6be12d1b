use std::fs;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVES: &str = "cleaning_service=info,tower_http=info";
const LOG_FILE_PREFIX: &str = "cleaning-service.log";

/// Initializes console logging and, when enabled, a daily-rotated JSON log
/// file. The returned guard must be kept alive so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let (subscriber, guard) = build_subscriber(config, filter);
    subscriber.init();
    guard
}

fn build_subscriber(
    config: &LoggingConfig,
    filter: EnvFilter,
) -> (impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>) {
    let (file_layer, guard) = match file_appender(config) {
        Some(appender) => {
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(non_blocking_writer)), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stdout));
    (subscriber, guard)
}

fn file_appender(config: &LoggingConfig) -> Option<RollingFileAppender> {
    if !config.file_output {
        return None;
    }

    let _ = fs::create_dir_all(&config.directory);
    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(&config.directory)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            // The subscriber is not installed yet.
            eprintln!("File logging disabled, cannot open '{}': {}", config.directory, e);
            None
        }
    }
}
