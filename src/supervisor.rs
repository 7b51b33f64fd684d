//! The supervision loop.
//!
//! A [`Supervisor`] owns a fixed list of resources. One call to
//! [`Supervisor::run`] is one run cycle: start every resource, watch their
//! error channels and health until something goes wrong or a stop is
//! requested, then close everything in registration order.
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::future::select_all;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    channel::{ErrorReceiver, ErrorReporter, error_channel},
    constants::DEFAULT_ERROR_BUFFER,
    error::{Error, SupervisorError},
    logger::Logger,
    multierror::MultiError,
    resource::Resource,
};

/// What a failed health check leads to.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnhealthyPolicy {
    /// Report on the supervisor's own channel, ending the run cycle.
    #[default]
    Escalate,
    /// Log a warning and keep running.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub check_interval: Duration,
    pub error_buffer: usize,
    pub on_unhealthy: UnhealthyPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            error_buffer: DEFAULT_ERROR_BUFFER,
            on_unhealthy: UnhealthyPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Initializing,
    Running,
    ShuttingDown,
    Closed,
}

type QuitSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

fn lock(slot: &QuitSlot) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the quit slot when a run cycle ends, however it ends.
struct Armed {
    slot: QuitSlot,
}

impl Drop for Armed {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    logger: Logger,
    resources: Vec<Box<dyn Resource>>,
    open: usize,
    reporter: ErrorReporter<Error>,
    errors: ErrorReceiver<Error>,
    interrupt_tx: mpsc::Sender<()>,
    interrupt_rx: mpsc::Receiver<()>,
    quit: QuitSlot,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, logger: Logger) -> Self {
        let logger = logger.component("supervisor");
        let (reporter, errors) = error_channel("supervisor", config.error_buffer, logger.clone());
        let (interrupt_tx, interrupt_rx) = mpsc::channel(1);
        Self {
            config,
            logger,
            resources: Vec::new(),
            open: 0,
            reporter,
            errors,
            interrupt_tx,
            interrupt_rx,
            quit: Arc::new(Mutex::new(None)),
            state: SupervisorState::Idle,
        }
    }

    /// Adds a resource. Resources start and close in registration order.
    pub fn register(&mut self, resource: impl Resource + 'static) -> &mut Self {
        self.resources.push(Box::new(resource));
        self
    }

    /// Names of the registered resources, in registration order.
    pub fn resources(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Reporter into the supervisor's own channel. Anything reported here
    /// ends the current run cycle with [`SupervisorError::Fatal`].
    pub fn reporter(&self) -> ErrorReporter<Error> {
        self.reporter.clone()
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            interrupt: self.interrupt_tx.clone(),
            quit: Arc::clone(&self.quit),
        }
    }

    /// Runs one cycle and returns why it ended.
    ///
    /// Resources are always closed before this returns. Their close failures
    /// are logged and never change the result.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        let (armed, mut quit) = self.arm()?;

        let result = self.supervise(&mut quit).await;
        // Already logged; shutdown never changes why the cycle ended.
        let _ = self.shutdown().await;
        drop(armed);

        result
    }

    fn arm(&mut self) -> Result<(Armed, oneshot::Receiver<()>), SupervisorError> {
        if self.config.check_interval.is_zero() {
            return Err(SupervisorError::InvalidConfig(
                "check interval must be greater than zero".into(),
            ));
        }

        let mut slot = lock(&self.quit);
        if slot.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        drop(slot);

        // An interrupt delivered between cycles belongs to no cycle.
        while self.interrupt_rx.try_recv().is_ok() {}
        self.drain_stale_errors();

        let armed = Armed {
            slot: Arc::clone(&self.quit),
        };
        Ok((armed, rx))
    }

    /// Errors reported after the previous cycle stopped reading, for example
    /// by a resource while it was closing, belong to that cycle.
    fn drain_stale_errors(&mut self) {
        let span = self.logger.span().clone();
        while let Some(err) = self.errors.try_recv() {
            warn!(parent: &span, "discarding error from previous run: {err}");
        }
        for resource in &mut self.resources {
            let name = resource.name().to_string();
            let Some(errors) = resource.errors() else {
                continue;
            };
            while let Some(err) = errors.try_recv() {
                warn!(
                    parent: &span,
                    resource = %name,
                    "discarding error from previous run: {err}"
                );
            }
        }
    }

    async fn supervise(
        &mut self,
        quit: &mut oneshot::Receiver<()>,
    ) -> Result<(), SupervisorError> {
        self.state = SupervisorState::Initializing;
        self.start_resources().await?;
        self.state = SupervisorState::Running;

        let period = self.config.check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(parent: self.logger.span(), "start supervisor success");

        loop {
            tokio::select! {
                _ = &mut *quit => {
                    info!(parent: self.logger.span(), "supervisor stop requested");
                    return Ok(());
                }
                Some(()) = self.interrupt_rx.recv() => {
                    info!(parent: self.logger.span(), "supervisor interrupted");
                    return Ok(());
                }
                _ = ticker.tick() => self.check_health().await,
                Some(err) = self.errors.recv() => {
                    error!(parent: self.logger.span(), "{err}");
                    return Err(SupervisorError::Fatal(err));
                }
                (resource, err) = next_resource_error(&mut self.resources) => {
                    error!(parent: self.logger.span(), resource = %resource, "{err}");
                    self.reporter.report(err);
                }
            }
        }
    }

    async fn start_resources(&mut self) -> Result<(), SupervisorError> {
        let span = self.logger.span().clone();
        for index in 0..self.resources.len() {
            let resource = &mut self.resources[index];
            let name = resource.name().to_string();
            if let Err(source) = resource.start().await {
                error!(parent: &span, "start resource '{name}': {source}");
                return Err(SupervisorError::Start {
                    resource: name,
                    source,
                });
            }
            debug!(parent: &span, "resource '{name}' started");
            self.open = index + 1;
        }
        Ok(())
    }

    async fn check_health(&self) {
        for resource in &self.resources[..self.open] {
            let Err(source) = resource.check().await else {
                continue;
            };
            let err = Error::Unhealthy {
                resource: resource.name().to_string(),
                source: Box::new(source),
            };
            match self.config.on_unhealthy {
                UnhealthyPolicy::Escalate => self.reporter.report(err),
                UnhealthyPolicy::Log => warn!(parent: self.logger.span(), "{err}"),
            }
        }
    }

    /// Closes the resources started in this cycle, in registration order.
    async fn shutdown(&mut self) -> Result<(), Error> {
        let open = std::mem::take(&mut self.open);
        if open == 0 {
            self.state = SupervisorState::Closed;
            return Ok(());
        }
        self.state = SupervisorState::ShuttingDown;

        let span = self.logger.span().clone();
        let mut errs = MultiError::default();
        for resource in &mut self.resources[..open] {
            let name = resource.name().to_string();
            match resource.close().await {
                Ok(()) => debug!(parent: &span, "resource '{name}' closed"),
                Err(err) => {
                    error!(parent: &span, "close resource '{name}': {err}");
                    errs.push(err);
                }
            }
        }
        self.state = SupervisorState::Closed;

        let count = errs.len();
        let result = errs.into_result().map_err(Error::Multiple);
        match &result {
            Ok(()) => info!(parent: self.logger.span(), "supervisor closed"),
            Err(err) => error!(
                parent: self.logger.span(),
                "supervisor closed with {count} error(s): {err}"
            ),
        }
        result
    }

    /// Closes every resource that is still open.
    ///
    /// Always returns `Ok`. Close failures are logged and swallowed, so a
    /// partially failed shutdown is visible only in the logs. Calling it after
    /// [`Supervisor::run`] returned, or twice, closes nothing.
    pub async fn close(&mut self) -> Result<(), SupervisorError> {
        let _ = self.shutdown().await;
        Ok(())
    }
}

/// Resolves with the next error any resource publishes. Never resolves when
/// no resource exposes an open channel.
async fn next_resource_error(resources: &mut [Box<dyn Resource>]) -> (String, Error) {
    let mut pending: Vec<_> = resources
        .iter_mut()
        .filter_map(|resource| {
            let name = resource.name().to_string();
            resource
                .errors()
                .map(|errors| Box::pin(async move { (name, errors.recv().await) }))
        })
        .collect();

    while !pending.is_empty() {
        let ((name, next), _, rest) = select_all(pending).await;
        match next {
            Some(err) => return (name, err),
            None => pending = rest,
        }
    }

    std::future::pending().await
}

/// Clonable control handle for a [`Supervisor`].
#[derive(Clone)]
pub struct SupervisorHandle {
    interrupt: mpsc::Sender<()>,
    quit: QuitSlot,
}

impl SupervisorHandle {
    /// Asks the running cycle to stop. Never blocks, so it is safe to call
    /// from a signal handler thread.
    pub fn interrupt(&self) {
        if self.interrupt.try_send(()).is_err() {
            debug!("supervisor interrupt already pending");
        }
    }

    /// Stops the running cycle. Only the first call per cycle succeeds.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        let sender = lock(&self.quit)
            .take()
            .ok_or(SupervisorError::NotRunning)?;
        sender.send(()).map_err(|_| SupervisorError::NotRunning)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.quit).is_some()
    }
}
