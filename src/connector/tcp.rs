use std::time::Duration;

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, net::TcpStream};

use super::Connection;
use crate::error::ConnectionError;

/// A held TCP connection to a database or queue broker.
///
/// Liveness is checked by dialling a fresh connection so that a half-open
/// held stream does not hide an unreachable backend.
pub struct TcpConnection {
    name: String,
    addr: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpConnection {
    /// Dials `addr`, failing after `timeout`.
    pub async fn connect(
        name: &str,
        addr: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = dial(name, addr, timeout).await?;
        Ok(Self {
            name: name.to_string(),
            addr: addr.to_string(),
            timeout,
            stream: Some(stream),
        })
    }

    /// Address this connection was opened against.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

async fn dial(name: &str, addr: &str, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ConnectionError::Dial {
            name: name.to_string(),
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ConnectionError::Timeout {
            name: name.to_string(),
            target: addr.to_string(),
            timeout,
        }),
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        if self.stream.is_none() {
            return Err(ConnectionError::Lost {
                name: self.name.clone(),
            });
        }

        dial(&self.name, &self.addr, self.timeout).await.map(drop)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        match stream.shutdown().await {
            Ok(()) => Ok(()),
            // The peer may already have gone away.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(source) => Err(ConnectionError::Close {
                name: self.name.clone(),
                source,
            }),
        }
    }
}
