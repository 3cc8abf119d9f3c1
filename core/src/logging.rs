//! Subscriber setup for the client's `tracing` records.
//!
//! Library code only emits records. Applications either install a process-wide
//! subscriber once with `LogService::init`, or build a `Dispatch` with
//! `LogService::dispatch` and hand it to `WebHdfsClient::with_dispatch`.

use std::fs;
use std::path::Path;

use tracing::Dispatch;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LogConfig;
use crate::error::ApiError;

pub struct LogService;

impl LogService {
    /// Install the global subscriber. Later calls leave the first one in place
    /// and return `Ok(None)`.
    ///
    /// Keep the returned guard alive for as long as file records should be
    /// flushed.
    pub fn init(log: &LogConfig) -> Result<Option<WorkerGuard>, ApiError> {
        if tracing::dispatcher::has_been_set() {
            tracing::debug!("global subscriber already installed");
            return Ok(None);
        }
        let (subscriber, guard) = Self::build(log)?;
        match subscriber.try_init() {
            Ok(()) => Ok(guard),
            Err(e) => {
                tracing::debug!(error = %e, "global subscriber already installed");
                Ok(None)
            }
        }
    }

    /// Build a subscriber without installing it.
    pub fn dispatch(log: &LogConfig) -> Result<(Dispatch, Option<WorkerGuard>), ApiError> {
        let (subscriber, guard) = Self::build(log)?;
        Ok((Dispatch::new(subscriber), guard))
    }

    pub fn init_for_test() {
        let _ = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
            .with(fmt::layer().with_test_writer())
            .try_init();
    }

    fn build(
        log: &LogConfig,
    ) -> Result<(impl tracing::Subscriber + Send + Sync + 'static, Option<WorkerGuard>), ApiError>
    {
        let console_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_filter);

        let (file_layer, guard) = match file_writer(log)? {
            Some((writer, guard)) => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_line_number(true)
                    .with_writer(writer)
                    .with_filter(LevelFilter::DEBUG);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        Ok((subscriber, guard))
    }
}

fn file_writer(log: &LogConfig) -> Result<Option<(NonBlocking, WorkerGuard)>, ApiError> {
    if !log.file_enabled {
        return Ok(None);
    }
    let dir = match log.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log
        .path
        .file_name()
        .ok_or_else(|| ApiError::LocalIo {
            path: log.path.display().to_string(),
            message: "log path has no file name".to_string(),
        })?
        .to_string_lossy()
        .into_owned();

    fs::create_dir_all(dir).map_err(|e| ApiError::local_io(dir, e))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| ApiError::LocalIo {
            path: log.path.display().to_string(),
            message: e.to_string(),
        })?;

    Ok(Some(tracing_appender::non_blocking(appender)))
}
