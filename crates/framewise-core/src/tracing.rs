//! Log output for framewise binaries.
//!
//! Library code never installs a global subscriber. Sessions record their
//! log lines inside their own span; only binaries call [`init_tracing`].
//!
//! ```ignore
//! use framewise_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::debug())?;
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Crates whose events pass the default filter.
const TARGETS: [&str; 4] = ["framewise", "framewise_core", "framewise_protocol", "framewise_client"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log level: {0}")]
    Level(String),
}

/// Line format of log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingOutputFormat {
    /// Multi-line, for a terminal.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, with the current span's fields.
    Json,
}

/// How [`init_tracing`] sets up the global subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for framewise crates when `RUST_LOG` is unset.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Print the source file and line of each event.
    pub show_source: bool,
    pub timestamps: bool,
    /// Log when spans (sessions, agents) open and close.
    pub span_events: bool,
    /// Filter directives used instead of `RUST_LOG` and `level`.
    pub directives: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            show_source: false,
            timestamps: true,
            span_events: false,
            directives: None,
        }
    }
}

impl TracingConfig {
    /// Compact debug output with source locations, for `--debug`.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            show_source: true,
            timestamps: false,
            span_events: true,
            directives: None,
        }
    }

    /// Builds a config from the `[logging]` section of the config file.
    pub fn from_settings(level: &str, format: TracingOutputFormat) -> Result<Self, TracingError> {
        let level = Level::from_str(level).map_err(|_| TracingError::Level(level.to_string()))?;
        Ok(Self {
            level,
            format,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref directives) = self.directives {
            return Ok(EnvFilter::try_new(directives)?);
        }
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = TARGETS
            .iter()
            .map(|target| format!("{target}={}", self.level))
            .collect::<Vec<_>>()
            .join(",");
        Ok(EnvFilter::try_new(directives)?)
    }

    fn layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let span_events = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_file(self.show_source)
            .with_line_number(self.show_source)
            .with_span_events(span_events);

        match (self.format, self.timestamps) {
            (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => base.compact().boxed(),
            (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
            (TracingOutputFormat::Json, true) => base.json().with_current_span(true).boxed(),
            (TracingOutputFormat::Json, false) => {
                base.json().with_current_span(true).without_time().boxed()
            }
        }
    }
}

/// Installs the global subscriber. Call once, from `main`.
///
/// `RUST_LOG` overrides the configured level unless explicit directives
/// were set.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or the filter
/// directives do not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let subscriber = tracing_subscriber::registry()
        .with(config.filter()?)
        .with(config.layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
