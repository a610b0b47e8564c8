//! Tracing configuration for structured logging
//!
//! The library only emits events; binaries decide where they go by
//! installing a subscriber through [`TracingConfig`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors and emojis (default for CLI)
    Console,
    /// Compact console output for CI environments
    Compact,
    /// JSON structured logging for log collectors
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set custom environment filter
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for request correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to a filter directive
    ///
    /// `-v` turns on this crate's stage decisions, `-vv` adds everything else.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "info,photo_retouch=debug",
            2 => "debug,photo_retouch=trace",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = match &self.env_filter {
            Some(env_filter) => EnvFilter::try_new(env_filter)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };
        // stdout carries image data in stream mode
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "🚀 Retouch session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI-friendly defaults
pub fn init_cli_tracing(verbosity: u8, json: bool) -> anyhow::Result<()> {
    let format = if json { json_format()? } else { TracingFormat::Console };

    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
}

#[cfg(feature = "tracing-json")]
#[allow(clippy::unnecessary_wraps)]
fn json_format() -> anyhow::Result<TracingFormat> {
    Ok(TracingFormat::Json)
}

#[cfg(not(feature = "tracing-json"))]
fn json_format() -> anyhow::Result<TracingFormat> {
    anyhow::bail!("JSON logging requires the tracing-json feature")
}

/// Span helpers for the main units of work
pub mod spans {
    use tracing::{info_span, Span};

    /// One input file handled by the CLI
    #[must_use]
    pub fn file_processing(file_path: &std::path::Path, operation: &str) -> Span {
        info_span!(
            "file_processing",
            file = %file_path.display(),
            operation = %operation
        )
    }
}

/// Event helpers with a consistent shape
pub mod events {
    use tracing::{debug, error, info, warn};

    /// Log a user-facing progress update
    pub fn progress(message: &str, emoji: &str) {
        info!("{} {}", emoji, message);
    }

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "❌ Operation failed");
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(message = %message, recommendation = %recommendation, "⚠️  Warning");
    }

    /// Log how long an operation took
    pub fn performance_metric(operation: &str, duration_ms: u64) {
        debug!(operation = %operation, duration_ms = %duration_ms, "⏱️  Performance metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(
            TracingConfig::new().with_verbosity(1).verbosity_to_filter(),
            "info,photo_retouch=debug"
        );
        assert_eq!(TracingConfig::new().with_verbosity(3).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_filters_parse() {
        for verbosity in 0..4 {
            let config = TracingConfig::new().with_verbosity(verbosity);
            assert!(EnvFilter::try_new(config.verbosity_to_filter()).is_ok());
        }
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("warn")
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("warn"));
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }
}
