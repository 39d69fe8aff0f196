//! Tracing setup for the controller binary.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable lines.
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Installs the global subscriber and routes `log` records into it.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Returns false if a
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            Registry::default().with(filter).with(fmt::layer()),
        ),
    }
    .is_ok();

    if installed {
        // Another logger may own the `log` facade already; events still flow through tracing.
        let _ = tracing_log::LogTracer::init();
    }
    installed
}
