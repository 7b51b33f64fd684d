//! The contract between the supervisor and the subsystems it owns.
use async_trait::async_trait;

use crate::{channel::ErrorReceiver, error::Error};

/// A long-lived subsystem owned and lifecycle-managed by a supervisor.
///
/// The supervisor is the only caller of every method here. It calls
/// [`Resource::start`] once per run cycle, drains [`Resource::errors`] while
/// running, probes [`Resource::check`] on every health tick and calls
/// [`Resource::close`] once on the way out.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Name used in logs and error context.
    fn name(&self) -> &str;

    /// Starts background work. Failures here abort the run cycle.
    async fn start(&mut self) -> Result<(), Error>;

    /// Channel through which background work publishes failures.
    fn errors(&mut self) -> Option<&mut ErrorReceiver<Error>> {
        None
    }

    /// Liveness probe.
    async fn check(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Stops background work and releases what the resource holds.
    async fn close(&mut self) -> Result<(), Error>;
}
