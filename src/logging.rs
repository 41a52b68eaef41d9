//! Logging setup for wirework
//!
//! The container instruments registration, construction, proxy decisions,
//! and teardown through `tracing` (behind the default `logging` feature).
//! This module adds optional subscriber bootstrap for binaries that do not
//! configure their own: JSON output for production aggregation, pretty
//! output for development.
//!
//! # Example
//!
//! ```rust,ignore
//! use wirework::logging;
//!
//! // One-liners:
//! logging::init_pretty();
//!
//! // Or configured:
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .container_only()
//!     .json()
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Output format for the bundled subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured lines (production default)
    #[default]
    Json,
    /// Colorful multi-line output (development)
    Pretty,
    /// Single-line compact output
    Compact,
}

/// Builder for subscriber configuration
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
        }
    }
}

#[cfg(feature = "logging")]
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

    /// Only show container events
    pub fn container_only(self) -> Self {
        self.with_target_filter("wirework")
    }

    /// Use JSON structured output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty colorful output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact single-line output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Install the subscriber.
    ///
    /// Requires the `logging-json` or `logging-pretty` feature; without a
    /// subscriber crate this is a no-op.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match self.target {
            Some(target) => EnvFilter::new(format!("{}={}", target, self.level)),
            None => EnvFilter::new(self.level.to_string()),
        };

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_target(true))
                    .init();
            }
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_target(true))
                    .init();
            }
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
        }
    }

    /// Install the subscriber (no-op without a subscriber feature)
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize JSON structured logging at DEBUG level
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init_json() {
    builder().json().init();
}

/// Initialize JSON logging (no-op without a subscriber feature)
#[cfg(all(feature = "logging", not(any(feature = "logging-json", feature = "logging-pretty"))))]
pub fn init_json() {}

/// Initialize pretty development logging at DEBUG level
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init_pretty() {
    builder().pretty().init();
}

/// Initialize pretty logging (no-op without a subscriber feature)
#[cfg(all(feature = "logging", not(any(feature = "logging-json", feature = "logging-pretty"))))]
pub fn init_pretty() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "logging")]
    #[test]
    fn builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.target.is_none());
    }

    #[cfg(feature = "logging")]
    #[test]
    fn builder_chain() {
        let builder = LoggingBuilder::new()
            .with_level(Level::TRACE)
            .pretty()
            .container_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert_eq!(builder.target, Some("wirework"));
    }
}
