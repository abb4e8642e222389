//! Structured logging setup.
//!
//! Bunyan-formatted JSON lines on stdout, filtered through `RUST_LOG`
//! (defaults to `info`).

use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::error::AppError;

pub fn get_subscriber<Sink>(
    name: impl Into<String>,
    default_filter: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let formatting_layer = BunyanFormattingLayer::new(name.into(), sink);
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init_subscriber(name: &str) -> Result<(), AppError> {
    let subscriber = get_subscriber(name, "info", std::io::stdout);
    set_global_default(subscriber)
        .map_err(|e| AppError::Internal(format!("failed to install tracing subscriber: {}", e)))
}
