//! Application composition: builds the supervised resources from a
//! [`Config`] and hands them to a [`Supervisor`].
use std::sync::Arc;

use tracing::info;

use crate::{
    config::Config,
    connector::{ConnectionGroup, Connector, NetConnector},
    error::{Error, SupervisorError},
    logger::Logger,
    process::{Heartbeat, TickerProcess},
    server::HttpServer,
    supervisor::{Supervisor, SupervisorHandle},
};

/// The assembled service.
pub struct Daemon {
    supervisor: Supervisor,
    logger: Logger,
}

impl Daemon {
    /// Opens every configured connection and prepares the HTTP server and
    /// background processes. Nothing is left open when this fails.
    pub async fn build(config: &Config, logger: Logger) -> Result<Self, Error> {
        Self::build_with(config, Arc::new(NetConnector), logger).await
    }

    /// Like [`Daemon::build`] with a custom way of opening connections.
    pub async fn build_with(
        config: &Config,
        connector: Arc<dyn Connector>,
        logger: Logger,
    ) -> Result<Self, Error> {
        let connections =
            ConnectionGroup::open(config.endpoints(), connector, logger.component("connections"))
                .await?;

        let server = HttpServer::new(config.server_config(), logger.clone());
        let ticker = TickerProcess::new(
            "ticker",
            config.processes.ticker.clone(),
            Heartbeat::default(),
            config.app.error_buffer,
            logger.clone(),
        );

        let mut supervisor = Supervisor::new(config.supervisor_config(), logger.clone());
        supervisor
            .register(server)
            .register(ticker)
            .register(connections);

        info!(
            parent: logger.span(),
            resources = ?supervisor.resources(),
            "daemon initialized"
        );
        Ok(Self { supervisor, logger })
    }

    /// Names of the supervised resources, in close order.
    pub fn resources(&self) -> Vec<&str> {
        self.supervisor.resources()
    }

    pub fn handle(&self) -> SupervisorHandle {
        self.supervisor.handle()
    }

    /// Runs until interrupted or until a resource fails.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        let result = self.supervisor.run().await;
        match &result {
            Ok(()) => info!(parent: self.logger.span(), "daemon stopped"),
            Err(err) => info!(parent: self.logger.span(), "daemon stopped: {err}"),
        }
        result
    }

    /// Releases whatever is still open. Always `Ok`; close failures only
    /// reach the logs.
    pub async fn close(&mut self) -> Result<(), SupervisorError> {
        self.supervisor.close().await
    }
}
