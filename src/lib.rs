//! servicekit is a scaffold for long-running network services. A supervisor
//! owns every long-lived subsystem (HTTP API, background processes, external
//! connections), watches their bounded error channels and health, and shuts
//! them all down in order when a signal arrives or something fails.

/// Bounded error channels with a fatal overflow path.
pub mod channel;

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// External connections.
pub mod connector;

/// Named defaults.
pub mod constants;

/// Application composition.
pub mod daemon;

/// Error handling.
pub mod error;

/// Logging handle and subscriber setup.
pub mod logger;

/// Error aggregation.
pub mod multierror;

/// Periodic background processes.
pub mod process;

/// The contract between the supervisor and its subsystems.
pub mod resource;

/// Graceful HTTP API server.
pub mod server;

/// Supervisor loop.
pub mod supervisor;
