//! Logging bootstrap for hosts embedding the sale engine.
//!
//! - Text or JSON output (switchable).
//! - EnvFilter: explicit directive string, else `RUST_LOG`, else `info`.
//! - The engine itself only emits `tracing` events; installing a subscriber is
//!   the host's call and happens at most once per process.

use thiserror::Error;
use tracing_subscriber::{filter::ParseError, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level directives, e.g. "info,aethernova_launchpad=debug". `None` reads `RUST_LOG`.
    pub env_filter: Option<String>,
    /// JSON lines (`true`) or human-readable text (`false`).
    pub json: bool,
    /// Print target, file and line.
    pub with_targets: bool,
    /// ANSI colors (text format only).
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: true,
            with_targets: true,
            ansi: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("global subscriber already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Resolve the level filter. An explicit directive must parse; the env fallback never fails.
pub fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    match &cfg.env_filter {
        Some(s) => Ok(EnvFilter::try_new(s.as_str())?),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Install the global subscriber. Call once at process start.
pub fn init_logging(cfg: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(cfg)?;

    let json = cfg.json.then(|| {
        fmt::layer()
            .json()
            .with_target(cfg.with_targets)
            .with_file(cfg.with_targets)
            .with_line_number(cfg.with_targets)
            .with_current_span(true)
            .flatten_event(true)
    });
    let text = (!cfg.json).then(|| {
        fmt::layer()
            .with_target(cfg.with_targets)
            .with_file(cfg.with_targets)
            .with_line_number(cfg.with_targets)
            .with_ansi(cfg.ansi)
    });

    Registry::default().with(filter).with(json).with(text).try_init()?;
    Ok(())
}
