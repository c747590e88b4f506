//! Logging infrastructure for Datasource Registry.
//!
//! This module provides structured logging using the tracing ecosystem.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Crates whose events pass the default filter.
const LOGGED_CRATES: [&str; 3] = ["dsr_core", "dsr_observability", "dsr_cli"];

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include span events.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include thread IDs.
    pub include_thread_ids: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a development configuration with more verbose output.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: true,
            include_target: true,
        }
    }

    /// Creates a production configuration with JSON output.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
        }
    }

    /// Builds a configuration from a level name and an output format.
    ///
    /// Unknown level names fall back to `info`.
    pub fn from_settings(level: &str, format: LogFormat) -> Self {
        Self {
            level: Level::from_str(level).unwrap_or(Level::INFO),
            json_format: format == LogFormat::Json,
            ..Self::default()
        }
    }

    /// Returns a copy with the level lowered to `debug` and spans enabled.
    pub fn verbose(mut self) -> Self {
        if self.level < Level::DEBUG {
            self.level = Level::DEBUG;
        }
        self.include_spans = true;
        self
    }

    fn filter_directives(&self) -> String {
        LOGGED_CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initializes the logging system with default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes the logging system with the given configuration.
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // Logs go to stderr so command output on stdout stays machine-readable.
    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

/// Creates a span for a repository call on one collection.
#[macro_export]
macro_rules! repository_span {
    ($collection:expr, $operation:expr) => {
        tracing::info_span!("repository", collection = %$collection, operation = %$operation)
    };
    ($collection:expr, $operation:expr, $($field:tt)*) => {
        tracing::info_span!("repository", collection = %$collection, operation = %$operation, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json_format);
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development();
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.json_format);
    }

    #[test]
    fn test_from_settings() {
        let config = LoggingConfig::from_settings("warn", LogFormat::Json);
        assert_eq!(config.level, Level::WARN);
        assert!(config.json_format);

        let fallback = LoggingConfig::from_settings("chatty", LogFormat::Text);
        assert_eq!(fallback.level, Level::INFO);
        assert!(!fallback.json_format);
    }

    #[test]
    fn test_verbose_never_raises_level() {
        let config = LoggingConfig::from_settings("warn", LogFormat::Text).verbose();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.include_spans);

        let trace = LoggingConfig::from_settings("trace", LogFormat::Text).verbose();
        assert_eq!(trace.level, Level::TRACE);
    }

    #[test]
    fn test_filter_directives_cover_workspace() {
        let directives = LoggingConfig::from_settings("debug", LogFormat::Text).filter_directives();
        assert_eq!(
            directives,
            "dsr_core=DEBUG,dsr_observability=DEBUG,dsr_cli=DEBUG"
        );
    }
}
