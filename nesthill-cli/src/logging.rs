//! Structured logging for the `nesthill` binary.
//!
//! Reports are written to stdout, so diagnostics go to stderr through one
//! global `tracing` subscriber. Records emitted through the `log` facade are
//! bridged into the same stream.

use std::{env, fmt, str::FromStr, sync::OnceLock};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::ParseError,
    fmt::format::FmtSpan,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Variable selecting the output format.
pub const FORMAT_VAR: &str = "NESTHILL_LOG_FORMAT";
/// Variable holding the filter directives.
pub const FILTER_VAR: &str = EnvFilter::DEFAULT_ENV;

const DEFAULT_DIRECTIVES: &str = "info";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format of the log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Human,
    /// One JSON object per event, with span context.
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::UnsupportedFormat {
                provided: normalized,
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Json => "json",
        })
    }
}

/// Errors raised while resolving or installing logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A logging variable held bytes that are not UTF-8.
    #[error("environment variable `{name}` is not valid UTF-8")]
    NotUnicode {
        /// Variable name.
        name: &'static str,
    },
    /// `NESTHILL_LOG_FORMAT` named an unknown format.
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat {
        /// Normalised value supplied by the user.
        provided: String,
    },
    /// `RUST_LOG` did not parse as filter directives.
    #[error("invalid log filter `{directives}`: {source}")]
    InvalidFilter {
        /// Directives as supplied.
        directives: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// The global subscriber could not be installed.
    #[error("failed to install tracing subscriber: {source}")]
    InstallFailed {
        /// Error raised by `tracing_subscriber`.
        #[source]
        source: TryInitError,
    },
}

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    directives: String,
    format: LogFormat,
}

impl LoggingConfig {
    /// Reads `NESTHILL_LOG_FORMAT` and `RUST_LOG`.
    ///
    /// # Errors
    /// Returns [`LoggingError`] when a variable is not UTF-8 or the format is
    /// unknown.
    pub fn from_env() -> Result<Self, LoggingError> {
        Self::from_lookup(|name| env::var(name))
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self, LoggingError> {
        let read = |name: &'static str| match lookup(name) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(LoggingError::NotUnicode { name }),
        };
        let format = match read(FORMAT_VAR)? {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };
        let directives = read(FILTER_VAR)?
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_owned());
        Ok(Self { directives, format })
    }

    /// Selected output format.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Filter directives, `info` when none were given.
    #[must_use]
    pub fn directives(&self) -> &str {
        &self.directives
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.directives).map_err(|source| LoggingError::InvalidFilter {
            directives: self.directives.clone(),
            source,
        })
    }

    /// Installs the global subscriber described by this configuration.
    ///
    /// # Errors
    /// Returns [`LoggingError::InvalidFilter`] for unparsable directives and
    /// [`LoggingError::InstallFailed`] when a subscriber is already set.
    pub fn install(&self) -> Result<(), LoggingError> {
        let filter = self.filter()?;
        let layer = tracing_subscriber::fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr);
        let layer = match self.format {
            LogFormat::Human => layer.boxed(),
            LogFormat::Json => layer
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        };

        // A logger installed by a host process keeps the `log` slot.
        drop(LogTracer::init());

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(|source| LoggingError::InstallFailed { source })
    }
}

/// Installs logging from the environment once per process.
///
/// A subscriber installed elsewhere is kept and reported as a warning.
///
/// # Errors
/// Returns [`LoggingError`] when the environment describes an invalid
/// configuration.
pub fn init_logging() -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let config = LoggingConfig::from_env()?;
    match config.install() {
        Ok(()) => tracing::debug!(
            format = %config.format(),
            directives = config.directives(),
            "logging installed"
        ),
        Err(LoggingError::InstallFailed { source }) => {
            tracing::warn!(error = %source, "structured logging already configured elsewhere");
        }
        Err(err) => return Err(err),
    }
    INSTALLED.get_or_init(|| ());
    Ok(())
}
