use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

use crate::helper::error_chain_fmt;

/// Composes the layers of the `tracing` Subscriber used by every service.
///
/// - an `EnvFilter` reading `RUST_LOG`, falling back to `fallback_env_filter` when unset
/// - a `JsonStorageLayer` propagating span fields to their children
/// - a `BunyanFormattingLayer` writing bunyan-compatible JSON records to `sink`
///
/// # Arguments
/// - `name`: name of the service, present on every emitted record
/// - `fallback_env_filter`: filter directives used when `RUST_LOG` has not been set
/// - `sink`: where the records are written (`std::io::stdout`, `std::io::sink` in tests)
pub fn get_tracing_subscriber<Sink>(
    name: String,
    fallback_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    // The sink implements `MakeWriter` for all choices of the lifetime `'a`
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_env_filter));

    let formatting_layer = BunyanFormattingLayer::new(name, sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Registers the given Subscriber as the process-wide default.
///
/// Records emitted through the `log` facade (ex: by `rdkafka`) are redirected to it.
/// It can only succeed once per process.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;

    Ok(())
}

#[derive(thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to redirect log records to tracing")]
    LogTracerError(#[from] SetLoggerError),
    #[error("Failed to set the global tracing subscriber")]
    SubscriberError(#[from] SetGlobalDefaultError),
}

impl std::fmt::Debug for TelemetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
