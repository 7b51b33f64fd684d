//! Error handling for servicekit.
use std::{io, time::Duration};

use thiserror::Error;

use crate::multierror::MultiError;

/// Any failure that travels through an error channel or out of a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An external connection failed.
    #[error("connector: {0}")]
    Connection(#[from] ConnectionError),

    /// The HTTP server failed to start, serve, answer or shut down.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A background process reported a failure from its periodic work.
    #[error("process '{process}': {message}")]
    Process {
        /// Name of the process that failed.
        process: String,
        /// Human-readable cause.
        message: String,
    },

    /// A liveness probe failed on a supervised resource.
    #[error("resource '{resource}' is unhealthy: {source}")]
    Unhealthy {
        /// Name of the resource whose probe failed.
        resource: String,
        /// The probe failure.
        #[source]
        source: Box<Error>,
    },

    /// Several failures collected while closing resources.
    #[error(transparent)]
    Multiple(MultiError<Error>),
}

impl Error {
    /// Builds a [`Error::Process`] failure.
    pub fn process(process: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Process {
            process: process.into(),
            message: message.into(),
        }
    }

    /// Reports whether the failure means "no such record" rather than a broken
    /// backend, regardless of which connection produced it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Connection(err) => err.is_not_found(),
            Error::Unhealthy { source, .. } => source.is_not_found(),
            Error::Multiple(errs) => errs.errors().iter().any(Error::is_not_found),
            _ => false,
        }
    }
}

/// Errors raised while loading and validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The file extension is neither YAML nor JSON.
    #[error("invalid config extension: {0:?}")]
    UnsupportedExtension(String),

    /// The YAML document is malformed or does not match the schema.
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The JSON document is malformed or does not match the schema.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file references an environment variable that is not set.
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A field holds a value the daemon cannot run with.
    #[error("config validation error: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// True when the file was readable but its content could not be parsed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ConfigError::Yaml(_) | ConfigError::Json(_))
    }
}

/// A log level that cannot be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogLevelError {
    /// Nothing was given.
    #[error("log level cannot be empty")]
    Empty,

    /// A numeric level past the end of the scale.
    #[error("unsupported log level number '{0}' (expected 0-5)")]
    OutOfScale(u64),

    /// Not a known level name.
    #[error("invalid log level '{0}'")]
    Unknown(String),
}

/// Errors raised by external connections and the connection group.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// TCP dial failed.
    #[error("{name}: dial {addr}: {source}")]
    Dial {
        /// Connection name.
        name: String,
        /// Address that was dialled.
        addr: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// TCP dial or HTTP probe did not finish in time.
    #[error("{name}: {target}: timed out after {timeout:?}")]
    Timeout {
        /// Connection name.
        name: String,
        /// Address or URL that was probed.
        target: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// HTTP probe could not be sent.
    #[error("{name}: request {url}: {source}")]
    Request {
        /// Connection name.
        name: String,
        /// URL that was requested.
        url: String,
        /// The underlying client failure.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP probe returned an unsuccessful status.
    #[error("{name}: {url} responded with status {status}")]
    Status {
        /// Connection name.
        name: String,
        /// URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The backend answered that the requested record does not exist.
    #[error("{name}: {target} not found")]
    NotFound {
        /// Connection name.
        name: String,
        /// What was looked up.
        target: String,
    },

    /// The connection was already closed.
    #[error("{name}: connection is lost")]
    Lost {
        /// Connection name.
        name: String,
    },

    /// Closing the connection failed.
    #[error("{name}: close: {source}")]
    Close {
        /// Connection name.
        name: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Opening the group failed; holds the open failure followed by any
    /// cleanup failures.
    #[error("open connections: {0}")]
    Open(MultiError<ConnectionError>),

    /// One or more members failed to close.
    #[error("close connections: {0}")]
    Shutdown(MultiError<ConnectionError>),
}

impl ConnectionError {
    /// Classifies "not found" answers so callers stay agnostic of backends.
    pub fn is_not_found(&self) -> bool {
        match self {
            ConnectionError::NotFound { .. } => true,
            ConnectionError::Open(errs) | ConnectionError::Shutdown(errs) => {
                errs.errors().iter().any(ConnectionError::is_not_found)
            }
            _ => false,
        }
    }
}

/// Errors raised by the graceful HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `close` was called on a server that is not serving, or twice.
    #[error("http api server is locked")]
    Locked,

    /// The listener could not be bound.
    #[error("start http server error: {0}")]
    Start(#[source] io::Error),

    /// The accept loop terminated with an error.
    #[error("serve http server error: {0}")]
    Serve(#[source] io::Error),

    /// In-flight requests did not finish before the shutdown deadline.
    #[error("shutdown http server error: deadline of {0:?} exceeded")]
    ShutdownTimeout(Duration),

    /// The serving task panicked or was cancelled unexpectedly.
    #[error("http server task failed: {0}")]
    Task(String),

    /// A classified error response could not be encoded.
    #[error("write http response error: {0}")]
    Respond(String),
}

/// Errors returned by the supervisor loop.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// `run` was called while a run cycle is active.
    #[error("supervisor is already running")]
    AlreadyRunning,

    /// A stop was requested while no run cycle is active.
    #[error("supervisor is locked: not running")]
    NotRunning,

    /// A resource failed to start; nothing is left running.
    #[error("start resource '{resource}': {source}")]
    Start {
        /// Name of the resource that failed.
        resource: String,
        /// The start failure.
        #[source]
        source: Error,
    },

    /// The supervisor was configured with values it cannot run with.
    #[error("invalid supervisor config: {0}")]
    InvalidConfig(String),

    /// The supervisor's own error channel delivered a failure.
    #[error("supervisor fatal error: {0}")]
    Fatal(#[source] Error),
}
