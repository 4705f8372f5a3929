//! Global subscriber installation.

use super::config::{DEFAULT_FILTER, LogFormat, TracingConfig};
use anyhow::{Context, Result};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Install the global subscriber described by `config`.
///
/// Fails if a subscriber is already installed. Invalid filter directives
/// fall back to `info`.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let layer = fmt::layer()
        .with_file(config.location)
        .with_line_number(config.location);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        // Span close events carry the duration of reconcile and lifecycle spans.
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(service = %config.service, format = ?config.format, "Tracing initialized");
    Ok(())
}
