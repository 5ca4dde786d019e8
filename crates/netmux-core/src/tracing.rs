//! Tracing setup shared by the netmux binaries.
//!
//! Library crates only emit events through the `tracing` macros. The process
//! embedding them decides where events go; the `netmux` CLI does so through
//! [`init_tracing`], picking a preset per subcommand.
//!
//! ```ignore
//! use netmux_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::daemon()).expect("failed to initialize tracing");
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Targets that get the configured level when no filter is given.
const NETMUX_TARGETS: &[&str] = &[
    "netmux_core",
    "netmux_protocol",
    "netmux_engine",
    "netmux_server",
    "netmux_client",
    "netmux",
];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How events are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading in a terminal.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the netmux targets when neither `env_filter` nor
    /// `RUST_LOG` is set.
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// File and line of the event.
    pub include_location: bool,
    /// Module path of the event.
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Log span open and close.
    pub include_span_events: bool,
    /// Filter directive that replaces both `RUST_LOG` and `default_level`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// One-shot commands: warnings only, single line, no timestamps.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::WARN,
            output_format: TracingOutputFormat::Compact,
            include_target: false,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// `cli` with `--debug`: routing decisions become visible.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
            ..Self::cli()
        }
    }

    /// Long-running server: JSON lines including span events.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// `target=level` for every netmux target, comma separated.
    pub fn default_directive(&self) -> String {
        NETMUX_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.default_level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match self.env_filter {
            Some(ref directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or if `env_filter`
/// does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = config.filter()?;

    let span_events = match config.include_span_events {
        true => FmtSpan::NEW | FmtSpan::CLOSE,
        false => FmtSpan::NONE,
    };
    let base = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_span_events(span_events);

    let layer = match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Pretty, _) => base.pretty().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingOutputFormat::Json, _) => base.json().boxed(),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(env_filter).with(layer),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let quiet = TracingConfig::cli();
        assert_eq!(quiet.default_level, Level::WARN);
        assert_eq!(quiet.output_format, TracingOutputFormat::Compact);
        assert!(!quiet.include_timestamp);
        assert!(!quiet.include_target);

        let debug = TracingConfig::cli_debug();
        assert_eq!(debug.default_level, Level::DEBUG);
        assert_eq!(debug.output_format, TracingOutputFormat::Compact);
        assert!(debug.include_location);

        let daemon = TracingConfig::daemon();
        assert_eq!(daemon.default_level, Level::INFO);
        assert_eq!(daemon.output_format, TracingOutputFormat::Json);
        assert!(daemon.include_span_events);
        assert!(daemon.include_timestamp);
    }

    #[test]
    fn default_directive_covers_every_crate() {
        let directive = TracingConfig::default()
            .with_level(Level::TRACE)
            .default_directive();
        assert!(directive.contains("netmux_engine=TRACE"));
        assert!(directive.contains("netmux_server=TRACE"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn explicit_filter_wins() {
        let config = TracingConfig::default().with_env_filter("netmux_engine=debug");
        assert_eq!(config.env_filter.as_deref(), Some("netmux_engine=debug"));
        assert!(config.filter().is_ok());
    }

    #[test]
    fn invalid_filter_is_an_error() {
        let config = TracingConfig::default().with_env_filter("netmux_engine=loud");
        assert!(matches!(config.filter(), Err(TracingError::EnvFilter(_))));
    }
}
