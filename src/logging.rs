//! Logging setup for conject diagnostics
//!
//! Every event the crate emits carries the `conject` target, so applications
//! with their own subscriber can filter resolution traces without any help
//! from this module. For applications without one, this module installs a
//! `tracing-subscriber` with a chosen format.
//!
//! Requires the `logging` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use conject::logging;
//!
//! logging::init_pretty();
//!
//! // Or customized:
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .conject_only()
//!     .json()
//!     .init();
//! ```

use tracing::Level;

/// Output format for the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output for development
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// JSON structured output for log aggregation
    Json,
}

/// Builder for the logging subscriber
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            target: None,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Only show events from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show conject resolution events
    pub fn conject_only(self) -> Self {
        self.with_target_filter("conject")
    }

    /// Use pretty multi-line output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Use JSON structured output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Install a global subscriber with the configured settings
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if let Some(target) = self.target {
            EnvFilter::new(format!("{}={}", target, self.level))
        } else {
            EnvFilter::new(self.level.to_string())
        };

        match self.format {
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty().with_target(true))
                    .init();
            }
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact().with_target(true))
                    .init();
            }
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_target(true))
                    .init();
            }
        }
    }
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install pretty debug-level logging
pub fn init_pretty() {
    builder().pretty().init();
}

/// Install JSON debug-level logging
pub fn init_json() {
    builder().json().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.target.is_none());
    }

    #[test]
    fn builder_chain() {
        let builder = LoggingBuilder::new()
            .with_level(Level::TRACE)
            .json()
            .conject_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Json);
        assert_eq!(builder.target, Some("conject"));
    }
}
