//! Periodic background processes.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug, error, info, warn};

use crate::{
    channel::{ErrorReceiver, ErrorReporter, error_channel},
    config::duration_str,
    constants::DEFAULT_TICKER_INTERVAL,
    error::{ConfigError, Error},
    logger::Logger,
    resource::Resource,
};

/// Settings of a [`TickerProcess`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerConfig {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "default_start_interval", with = "duration_str")]
    pub start_interval: Duration,
}

fn default_start_interval() -> Duration {
    DEFAULT_TICKER_INTERVAL
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            start_interval: DEFAULT_TICKER_INTERVAL,
        }
    }
}

impl TickerConfig {
    /// A disabled process needs no interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.disabled && self.start_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "processes.ticker.start_interval is empty".into(),
            ));
        }
        Ok(())
    }
}

/// Work performed on every tick.
#[async_trait]
pub trait Tick: Send + Sync + 'static {
    async fn tick(&mut self) -> Result<(), Error>;
}

/// Tick that only counts and logs.
#[derive(Debug, Default)]
pub struct Heartbeat {
    count: u64,
}

#[async_trait]
impl Tick for Heartbeat {
    async fn tick(&mut self) -> Result<(), Error> {
        self.count += 1;
        debug!(count = self.count, "heartbeat");
        Ok(())
    }
}

/// Runs a [`Tick`] every `start_interval` in a background task.
pub struct TickerProcess {
    name: String,
    config: TickerConfig,
    logger: Logger,
    tick: Option<Box<dyn Tick>>,
    reporter: ErrorReporter<Error>,
    errors: ErrorReceiver<Error>,
    quit: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Box<dyn Tick>>>,
}

impl TickerProcess {
    pub fn new(
        name: &str,
        config: TickerConfig,
        tick: impl Tick,
        error_buffer: usize,
        logger: Logger,
    ) -> Self {
        let logger = logger.component(name);
        let (reporter, errors) = error_channel(name, error_buffer, logger.clone());
        Self {
            name: name.to_string(),
            config,
            logger,
            tick: Some(Box::new(tick)),
            reporter,
            errors,
            quit: None,
            task: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Starts ticking. Disabled or already started processes are left alone.
    pub fn run(&mut self) {
        let span = self.logger.span().clone();
        let _enter = span.enter();

        if self.config.disabled {
            debug!("cannot run disabled process");
            return;
        }
        if self.task.is_some() {
            warn!("process already been started");
            return;
        }
        if self.config.start_interval.is_zero() {
            error!("cannot run process with a zero start interval");
            return;
        }
        let Some(tick) = self.tick.take() else {
            error!("process lost its tick in a previous run");
            return;
        };

        let (quit_tx, quit_rx) = oneshot::channel();
        self.quit = Some(quit_tx);
        self.task = Some(tokio::spawn(
            ticking(tick, self.config.start_interval, quit_rx, self.reporter.clone())
                .instrument(span.clone()),
        ));
        info!("process started");
    }

    /// Stops ticking and waits for the task to finish.
    pub async fn quit(&mut self) {
        if self.config.disabled {
            debug!(parent: self.logger.span(), "cannot quit disabled process");
            return;
        }
        let Some(quit) = self.quit.take() else {
            debug!(parent: self.logger.span(), "cannot quit stopped process");
            return;
        };

        // The task may already be gone; joining below covers both cases.
        let _ = quit.send(());

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(tick) => self.tick = Some(tick),
                Err(err) => error!(parent: self.logger.span(), "process task failed: {err}"),
            }
        }
    }
}

async fn ticking(
    mut tick: Box<dyn Tick>,
    period: Duration,
    mut quit: oneshot::Receiver<()>,
    reporter: ErrorReporter<Error>,
) -> Box<dyn Tick> {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut quit => {
                debug!("process quit...");
                break;
            }
            _ = ticker.tick() => {
                debug!("process tick...");
                reporter.report_result(tick.tick().await);
            }
        }
    }

    info!("process stopped");
    tick
}

#[async_trait]
impl Resource for TickerProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<(), Error> {
        self.config.validate()?;
        self.run();
        Ok(())
    }

    fn errors(&mut self) -> Option<&mut ErrorReceiver<Error>> {
        Some(&mut self.errors)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.quit().await;
        Ok(())
    }
}
