//! Subscriber setup for the `quickdaq` binary and embedding hosts.
//!
//! The library itself only emits `tracing` events. [`init`] installs a
//! `tracing-subscriber` registry whose filter comes from `RUST_LOG` when set
//! and from `logging.level` otherwise.
//!
//! ```no_run
//! use quick_daq::{config::DaqConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DaqConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(prefix = %config.device_prefix, "quickDAQ starting");
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::DaqConfig;

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Multi-line, colored; bench use
    #[default]
    Pretty,
    /// One line per event, no colors
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Subscriber settings derived from the `logging` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Maximum level when `RUST_LOG` is unset
    pub level: Level,
    /// Line layout
    pub format: OutputFormat,
    /// Emit span open/close events
    pub span_events: bool,
    /// Print source file and line of each event
    pub source_location: bool,
    /// Colored output for the pretty layout
    pub ansi: bool,
}

impl TracingConfig {
    /// Pretty output at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: OutputFormat::Pretty,
            span_events: false,
            source_location: false,
            ansi: true,
        }
    }

    /// Settings for a loaded configuration.
    pub fn from_config(config: &DaqConfig) -> Result<Self, String> {
        let mut settings = Self::new(parse_log_level(&config.logging.level)?);
        settings.format = config.logging.format;
        settings.source_location = settings.level >= Level::DEBUG;
        Ok(settings)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::default().add_directive(LevelFilter::from_level(self.level).into())
        })
    }
}

/// Install the subscriber described by `config.logging`.
pub fn init_from_config(config: &DaqConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Install a global subscriber.
///
/// Returns `Ok(())` when one is already installed.
pub fn init(settings: TracingConfig) -> Result<(), String> {
    let filter = settings.filter();
    let spans = if settings.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let fmt_layer = fmt::layer()
        .with_span_events(spans)
        .with_file(settings.source_location)
        .with_line_number(settings.source_location);

    let layer = match settings.format {
        OutputFormat::Pretty => fmt_layer
            .pretty()
            .with_ansi(settings.ansi)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Compact => fmt_layer.compact().with_ansi(false).with_filter(filter).boxed(),
        OutputFormat::Json => fmt_layer.json().with_filter(filter).boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(format!("Failed to install tracing subscriber: {e}")),
    }
}

/// Parse a case-insensitive level name.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    Level::from_str(level.trim())
        .map_err(|_| format!("Unknown log level '{level}'. Use trace, debug, info, warn or error"))
}
