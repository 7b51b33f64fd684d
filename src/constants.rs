//! Constants and default values for the servicekit daemon.
//!
//! This module centralizes the magic numbers and names used throughout the
//! daemon so that defaults live in one place.

use std::time::Duration;

// ============================================================================
// Service Identity
// ============================================================================

/// Name of the service. Displayed in logs and in `--help` output.
pub const SERVICE_NAME: &str = "servicekit";

/// Service version in semantic versioning format, taken from the package.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Error Channels
// ============================================================================

/// Capacity of a component's error channel when the configuration does not
/// say otherwise. Reporting into a full channel is fatal.
pub const DEFAULT_ERROR_BUFFER: usize = 100;

// ============================================================================
// HTTP Server
// ============================================================================

/// Time given to in-flight requests once the HTTP server is asked to stop.
/// When it elapses the listener is force-closed.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Address the HTTP server binds to; only the port is configurable.
pub const LISTEN_HOST: &str = "0.0.0.0";

// ============================================================================
// Connections and Processes
// ============================================================================

/// Dial/probe timeout for connections that do not configure one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tick interval of the background ticker process when not configured.
pub const DEFAULT_TICKER_INTERVAL: Duration = Duration::from_secs(5);
