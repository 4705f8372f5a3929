//! Logging configuration read from the environment.

use std::env;
use std::io::IsTerminal;

/// Filter used when neither `BRIDGE_LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line output for terminals.
    Pretty,
    /// One line per event.
    Compact,
}

impl LogFormat {
    /// Parse a format name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }

    /// Pretty on a terminal, JSON otherwise.
    fn for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Logging settings for one binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Binary name, logged once at startup.
    pub service: String,
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives.
    pub filter: String,
    /// Record file and line on every event.
    pub location: bool,
}

impl TracingConfig {
    /// Read `BRIDGE_LOG_FORMAT`, `BRIDGE_LOG_LEVEL` (or `RUST_LOG`) and
    /// `BRIDGE_LOG_LOCATION`.
    pub fn from_env(service: &str) -> Self {
        Self::from_lookup(service, |key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// A missing or unknown format picks one from whether stdout is a
    /// terminal.
    pub fn from_lookup(service: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service: service.to_string(),
            format: lookup("BRIDGE_LOG_FORMAT")
                .and_then(|name| LogFormat::parse(&name))
                .unwrap_or_else(LogFormat::for_stdout),
            filter: lookup("BRIDGE_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            location: lookup("BRIDGE_LOG_LOCATION").is_some_and(|v| v == "true" || v == "1"),
        }
    }
}
