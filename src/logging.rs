//! Tracing setup for the front end.
//!
//! The `[logging]` section picks a level and one of three output formats. `RUST_LOG`, when set,
//! replaces the level filter entirely so individual modules can be turned up at runtime:
//!
//! ```bash
//! RUST_LOG=liric::network::relay=debug liric serve --config config/liric.toml
//! ```
//!
//! ```no_run
//! use liric::logging::{self, LogFormat, TracingConfig};
//! use tracing::Level;
//!
//! # fn main() -> liric::error::AppResult<()> {
//! logging::init(TracingConfig::new(Level::DEBUG).with_format(LogFormat::Compact))?;
//! tracing::info!(port = 8284, "Liric starting");
//! # Ok(())
//! # }
//! ```

use crate::config::LoggingSettings;
use crate::error::{AppResult, LiricError};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, coloured when writing to a terminal
    #[default]
    Pretty,
    /// One line per event, no colour.
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = LiricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(LiricError::Configuration(format!(
                "logging.format '{other}' is not one of pretty, compact, json"
            ))),
        }
    }
}

/// Subscriber settings, usually built from `[logging]`.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Used unless `RUST_LOG` is set.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Emit an event when each span closes, with its busy and idle time.
    pub span_timings: bool,
}

impl TracingConfig {
    /// Pretty output at `level`, no span timings.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::default(),
            span_timings: false,
        }
    }

    /// Rejects unknown level or format names.
    pub fn from_settings(settings: &LoggingSettings) -> AppResult<Self> {
        let level = Level::from_str(settings.level.trim()).map_err(|_| {
            LiricError::Configuration(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                settings.level
            ))
        })?;
        Ok(Self::new(level).with_format(settings.format.parse()?))
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Turns span close events on or off.
    pub fn with_span_timings(mut self, enabled: bool) -> Self {
        self.span_timings = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| {
                EnvFilter::default().add_directive(LevelFilter::from_level(self.level).into())
            })
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_timings {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let filter = self.filter();
        match self.format {
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(true)
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_events(spans)
                .with_filter(filter)
                .boxed(),
        }
    }
}

/// Installs the global subscriber. Does nothing if one is already installed.
pub fn init(config: TracingConfig) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(config.layer())
        .try_init()
        .map_err(|e| {
            LiricError::Configuration(format!("failed to install tracing subscriber: {e}"))
        })
}

/// Most verbose level currently enabled, as reported by GET_STATUS.
pub fn current_level() -> String {
    LevelFilter::current().to_string()
}
