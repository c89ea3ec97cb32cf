//! Tracing subscriber setup shared by binaries and integration tests.

use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Environment variable holding the log filter, e.g. `shelflife=debug`.
pub const LOG_ENV: &str = "SHELFLIFE_LOG";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Filter from `SHELFLIFE_LOG`, then `fallback`, then `info`.
pub fn env_filter(fallback: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    EnvFilter::try_new(&filter).map_err(|e| TelemetryError::InvalidFilter {
        filter,
        reason: e.to_string(),
    })
}

/// Installs the global subscriber and routes `log` records into it.
///
/// The persistence layer logs through `log`; everything else uses `tracing`
/// spans and events.
pub fn init_tracing(fallback: Option<&str>, json: bool) -> Result<(), TelemetryError> {
    let filter = env_filter(fallback)?;

    tracing_log::LogTracer::init().map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    let result = if json {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true));
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        tracing::subscriber::set_global_default(subscriber)
    };

    result.map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))
}
