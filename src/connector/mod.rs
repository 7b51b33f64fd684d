//! External connections grouped behind one handle.
//!
//! The group is all-or-nothing: it either opens every configured connection
//! or none of them, so the supervisor never has to reason about a partially
//! connected set.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{debug, info, warn};

use crate::{
    error::{ConnectionError, Error},
    logger::Logger,
    multierror::MultiError,
    resource::Resource,
};

mod http;
mod tcp;

pub use http::HttpConnection;
pub use tcp::TcpConnection;

/// Backends the scaffold knows how to reach, in opening order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionKind {
    Postgres,
    Clickhouse,
    Elasticsearch,
    Redis,
    Rabbitmq,
}

/// How a connection is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Plain TCP address (`host:port`).
    Tcp { addr: String },
    /// HTTP base URL probed with `GET`.
    Http { url: String },
}

/// One configured connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: ConnectionKind,
    pub target: Target,
    pub timeout: Duration,
}

impl Endpoint {
    /// Connection name used in logs and errors.
    pub fn name(&self) -> &str {
        self.kind.as_ref()
    }
}

/// An open connection to an external system.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection name used in logs and errors.
    fn name(&self) -> &str;

    /// Checks that the backend is still reachable.
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// Releases the connection. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Opens connections from endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Connector that dials TCP endpoints and probes HTTP endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetConnector;

#[async_trait]
impl Connector for NetConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError> {
        match &endpoint.target {
            Target::Tcp { addr } => {
                let conn = TcpConnection::connect(endpoint.name(), addr, endpoint.timeout).await?;
                Ok(Box::new(conn))
            }
            Target::Http { url } => {
                let conn = HttpConnection::connect(endpoint.name(), url, endpoint.timeout).await?;
                Ok(Box::new(conn))
            }
        }
    }
}

/// A fixed, ordered set of named connections with combined liveness and
/// close semantics.
pub struct ConnectionGroup {
    endpoints: Vec<Endpoint>,
    connector: Arc<dyn Connector>,
    members: Vec<Box<dyn Connection>>,
    closed: bool,
    logger: Logger,
}

impl ConnectionGroup {
    /// Opens every endpoint in order.
    ///
    /// On the first failure the remaining endpoints are skipped, everything
    /// opened so far is closed, and the open error is returned together with
    /// any close errors in a single [`ConnectionError::Open`].
    pub async fn open(
        endpoints: Vec<Endpoint>,
        connector: Arc<dyn Connector>,
        logger: Logger,
    ) -> Result<Self, ConnectionError> {
        let members = connect_all(&endpoints, connector.as_ref()).await?;
        info!("opened {} connection(s)", members.len());

        Ok(Self {
            endpoints,
            connector,
            members,
            closed: false,
            logger,
        })
    }

    /// Names of the open connections, in opening order.
    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|conn| conn.name()).collect()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when no connection is open.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Probes every member in order and returns the first failure.
    pub async fn check_liveness(&self) -> Result<(), ConnectionError> {
        for conn in &self.members {
            conn.ping().await?;
        }
        Ok(())
    }

    /// Closes every member regardless of earlier failures.
    pub async fn close_all(&mut self) -> Result<(), ConnectionError> {
        let mut errs = MultiError::default();
        for mut conn in self.members.drain(..) {
            debug!("closing connection '{}'", conn.name());
            errs.append(conn.close().await);
        }
        self.closed = true;

        errs.into_result().map_err(ConnectionError::Shutdown)
    }
}

async fn connect_all(
    endpoints: &[Endpoint],
    connector: &dyn Connector,
) -> Result<Vec<Box<dyn Connection>>, ConnectionError> {
    let mut members: Vec<Box<dyn Connection>> = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        match connector.connect(endpoint).await {
            Ok(conn) => {
                debug!("connection '{}' established", conn.name());
                members.push(conn);
            }
            Err(err) => {
                warn!("connection '{}' failed: {err}", endpoint.name());
                let mut errs = MultiError::new(vec![err]);
                for conn in members.iter_mut() {
                    errs.append(conn.close().await);
                }
                return Err(ConnectionError::Open(errs));
            }
        }
    }

    Ok(members)
}

#[async_trait]
impl Resource for ConnectionGroup {
    fn name(&self) -> &str {
        "connections"
    }

    async fn start(&mut self) -> Result<(), Error> {
        if self.closed {
            self.members = connect_all(&self.endpoints, self.connector.as_ref()).await?;
            self.closed = false;
            info!("reopened {} connection(s)", self.members.len());
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), Error> {
        Ok(self.check_liveness().await?)
    }

    async fn close(&mut self) -> Result<(), Error> {
        let result = self.close_all().await;
        if result.is_ok() {
            info!(parent: self.logger.span(), "connections closed");
        }
        Ok(result?)
    }
}
