//! Graceful HTTP API server.
//!
//! The server runs its accept loop in a background task and reports every
//! asynchronous failure on its own bounded error channel. Stopping is a
//! one-shot operation: [`HttpServer::close`] signals the shutdown watcher,
//! which lets in-flight requests finish for at most the configured deadline
//! before the listener is force-closed.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use axum::Router;
use strum_macros::{AsRefStr, Display};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{Instrument, debug, error, info, warn};

use crate::{
    channel::{ErrorReceiver, ErrorReporter, error_channel},
    constants::{DEFAULT_ERROR_BUFFER, LISTEN_HOST, SHUTDOWN_TIMEOUT},
    error::{Error, ServerError},
    logger::Logger,
    resource::Resource,
};

mod response;
mod router;

pub use response::{ApiError, ApiResult, Envelope, serve_list, serve_result};
pub use router::router;

/// Lifecycle of an [`HttpServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ServerState {
    Created,
    Serving,
    Stopping,
    Stopped,
}

/// Settings for an [`HttpServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub shutdown_timeout: Duration,
    pub error_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            error_buffer: DEFAULT_ERROR_BUFFER,
        }
    }
}

pub struct HttpServer {
    config: ServerConfig,
    logger: Logger,
    routes: Router,
    reporter: ErrorReporter<Error>,
    errors: ErrorReceiver<Error>,
    quit: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
    state: ServerState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, logger: Logger) -> Self {
        let logger = logger.component("http");
        let (reporter, errors) = error_channel("http api server", config.error_buffer, logger.clone());
        Self {
            config,
            logger,
            routes: Router::new(),
            reporter,
            errors,
            quit: None,
            watcher: None,
            state: ServerState::Created,
        }
    }

    /// Adds application routes next to the built-in ones.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Receiver for failures of the background tasks.
    pub fn errors(&mut self) -> &mut ErrorReceiver<Error> {
        &mut self.errors
    }

    /// Starts serving on `0.0.0.0:port` in the background.
    ///
    /// Returns immediately; a bind failure arrives on the error channel as
    /// [`ServerError::Start`]. Must be called within a Tokio runtime.
    pub fn serve(&mut self, port: u16) {
        let addr = format!("{LISTEN_HOST}:{port}");
        self.spawn_serving(move |app, stop, reporter| async move {
            match TcpListener::bind(&addr).await {
                Ok(listener) => run_server(listener, app, stop, reporter).await,
                Err(err) => {
                    error!("bind {addr}: {err}");
                    reporter.report(ServerError::Start(err).into());
                }
            }
        });
    }

    /// Starts serving on an already bound listener.
    pub fn serve_listener(&mut self, listener: TcpListener) {
        self.spawn_serving(move |app, stop, reporter| run_server(listener, app, stop, reporter));
    }

    fn spawn_serving<F, Fut>(&mut self, serve: F)
    where
        F: FnOnce(Router, oneshot::Receiver<()>, ErrorReporter<Error>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.quit.is_some() {
            warn!(parent: self.logger.span(), "http api server is already serving");
            return;
        }

        let (quit_tx, quit_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let app = router(self.routes.clone(), self.reporter.clone());

        let serving = tokio::spawn(
            serve(app, stop_rx, self.reporter.clone()).instrument(self.logger.span().clone()),
        );
        let watcher = tokio::spawn(
            watch(
                quit_rx,
                stop_tx,
                serving,
                self.config.shutdown_timeout,
                self.reporter.clone(),
            )
            .instrument(self.logger.span().clone()),
        );

        self.quit = Some(quit_tx);
        self.watcher = Some(watcher);
        self.state = ServerState::Serving;
    }

    /// Stops the server gracefully.
    ///
    /// Fails with [`ServerError::Locked`] when the server is not serving or
    /// was already closed. Otherwise waits for the shutdown watcher; a missed
    /// shutdown deadline is reported on the error channel, not returned here.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let Some(quit) = self.quit.take() else {
            return Err(ServerError::Locked);
        };
        let watcher = self.watcher.take();

        if quit.send(()).is_err() {
            return Err(ServerError::Locked);
        }
        self.state = ServerState::Stopping;

        if let Some(watcher) = watcher {
            if let Err(err) = watcher.await {
                error!(parent: self.logger.span(), "http shutdown watcher failed: {err}");
            }
        }

        self.state = ServerState::Stopped;
        info!(parent: self.logger.span(), "stop http api success");
        Ok(())
    }
}

async fn run_server(
    listener: TcpListener,
    app: Router,
    stop: oneshot::Receiver<()>,
    reporter: ErrorReporter<Error>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("start http api on {addr}");
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop.await;
        })
        .await;

    if let Err(err) = result {
        error!("http api stopped serving: {err}");
        reporter.report(ServerError::Serve(err).into());
    }
}

/// Waits for the quit signal, then stops the accept loop and enforces the
/// shutdown deadline.
async fn watch(
    quit: oneshot::Receiver<()>,
    stop: oneshot::Sender<()>,
    mut serving: JoinHandle<()>,
    deadline: Duration,
    reporter: ErrorReporter<Error>,
) {
    // A dropped sender means the server itself was dropped: stop as well.
    let _ = quit.await;
    let _ = stop.send(());
    debug!("graceful shutdown started");

    match tokio::time::timeout(deadline, &mut serving).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => reporter.report(ServerError::Task(err.to_string()).into()),
        Err(_) => {
            serving.abort();
            error!("shutdown deadline of {deadline:?} exceeded, forcing close");
            reporter.report(ServerError::ShutdownTimeout(deadline).into());
        }
    }
}

#[async_trait]
impl Resource for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&mut self) -> Result<(), Error> {
        self.serve(self.config.port);
        Ok(())
    }

    fn errors(&mut self) -> Option<&mut ErrorReceiver<Error>> {
        Some(&mut self.errors)
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(HttpServer::close(self).await?)
    }
}
