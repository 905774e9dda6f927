//! Tracing subscriber initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`). Output is JSON unless
//! `LOG_FORMAT=pretty` is set, which is easier to read in a terminal.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

const FORMAT_VAR: &str = "LOG_FORMAT";

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log format `{0}` (expected `json` or `pretty`)")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

/// Initialize tracing with the format named by `LOG_FORMAT`.
///
/// An unknown format falls back to JSON and says so once the subscriber is up.
pub fn init() {
    let requested = std::env::var(FORMAT_VAR).ok();
    let parsed = requested.as_deref().map(LogFormat::from_str).transpose();

    match parsed {
        Ok(format) => init_with(format.unwrap_or_default()),
        Err(err) => {
            init_with(LogFormat::Json);
            ::tracing::warn!(error = %err, "falling back to json logs");
        }
    }
}

/// Initialize tracing with an explicit format.
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.with_target(true).try_init(),
    };
}
