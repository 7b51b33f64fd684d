//! Logging handle injected into every component, plus subscriber setup.
use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, EnumString};
use tracing::{Span, error, info_span, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::error::LogLevelError;

/// Callback run after a fatal message has been logged.
pub type FatalHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Verbosity of the service logs.
///
/// Accepts level names, a few common aliases and the numeric scale 0 (off)
/// to 5 (trace), from the command line as well as from config files, where
/// the number may be written unquoted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevel(LevelFilter);

/// Levels indexed by their numeric shorthand.
const SCALE: [LevelFilter; 6] = [
    LevelFilter::OFF,
    LevelFilter::ERROR,
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
    LevelFilter::TRACE,
];

impl LogLevel {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }

    /// The tracing filter this level maps to.
    pub fn filter(&self) -> LevelFilter {
        self.0
    }

    /// Level for a numeric shorthand.
    pub fn from_number(number: u64) -> Result<Self, LogLevelError> {
        usize::try_from(number)
            .ok()
            .and_then(|index| SCALE.get(index))
            .map(|level| LogLevel(*level))
            .ok_or(LogLevelError::OutOfScale(number))
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(LevelFilter::INFO)
    }
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        LogLevel(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogLevelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim();
        if name.is_empty() {
            return Err(LogLevelError::Empty);
        }
        if let Ok(number) = name.parse::<u64>() {
            return Self::from_number(number);
        }

        let level = match name.to_ascii_lowercase().as_str() {
            "off" | "none" => LevelFilter::OFF,
            "error" | "err" | "fatal" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => return Err(LogLevelError::Unknown(name.to_string())),
        };
        Ok(LogLevel(level))
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Name(String),
        }

        let level = match Raw::deserialize(deserializer)? {
            Raw::Number(number) => LogLevel::from_number(number),
            Raw::Name(name) => name.parse(),
        };
        level.map_err(serde::de::Error::custom)
    }
}

/// Shape of the log lines written by [`init_tracing`].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line, with the service span fields attached.
    Json,
}

/// Explicit logging handle.
///
/// Carries the service identity as span fields, the configured level and the
/// hook that terminates the process on fatal conditions. Cloning is cheap.
#[derive(Clone)]
pub struct Logger {
    service: Arc<str>,
    version: Arc<str>,
    level: LogLevel,
    span: Span,
    fatal: FatalHook,
}

impl Logger {
    /// Creates a handle whose fatal path exits the process with status 1.
    pub fn new(service: &str, version: &str, level: LogLevel) -> Self {
        let span = info_span!("service", service = %service, version = %version);
        Self {
            service: Arc::from(service),
            version: Arc::from(version),
            level,
            span,
            fatal: Arc::new(|_| std::process::exit(1)),
        }
    }

    /// Replaces what happens after a fatal message is logged.
    pub fn with_fatal_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.fatal = Arc::new(hook);
        self
    }

    /// Handle for a named component; its span is a child of this one.
    pub fn component(&self, name: &str) -> Self {
        Self {
            span: info_span!(parent: &self.span, "component", name = %name),
            ..self.clone()
        }
    }

    /// Span to instrument spawned tasks with.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Service version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Configured verbosity.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Logs `message` at error level marked as fatal, then runs the fatal hook.
    pub fn fatal(&self, message: &str) {
        error!(parent: &self.span, fatal = true, "{message}");
        (self.fatal)(message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("service", &self.service)
            .field("version", &self.version)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// Installs the global fmt subscriber, writing to stderr.
///
/// An explicit `level` wins; otherwise `RUST_LOG` is honoured and `fallback`
/// applies when it is unset.
pub fn init_tracing(level: Option<LogLevel>, fallback: LogLevel, format: LogFormat) {
    let filter = if let Some(level) = level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback.as_str()))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
    };
}
