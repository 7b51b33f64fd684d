use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::Connection;
use crate::error::ConnectionError;

/// An HTTP-speaking backend such as a search cluster, probed with `GET`.
pub struct HttpConnection {
    name: String,
    url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl HttpConnection {
    /// Builds a client for `url` and performs one probe.
    pub async fn connect(
        name: &str,
        url: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let client = Client::builder().timeout(timeout).build().map_err(|source| {
            ConnectionError::Request {
                name: name.to_string(),
                url: url.to_string(),
                source,
            }
        })?;

        let conn = Self {
            name: name.to_string(),
            url: url.to_string(),
            timeout,
            client: Some(client),
        };
        conn.ping().await?;
        Ok(conn)
    }

    /// Base URL this connection probes.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, source: reqwest::Error) -> ConnectionError {
        if source.is_timeout() {
            ConnectionError::Timeout {
                name: self.name.clone(),
                target: self.url.clone(),
                timeout: self.timeout,
            }
        } else {
            ConnectionError::Request {
                name: self.name.clone(),
                url: self.url.clone(),
                source,
            }
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        let Some(client) = &self.client else {
            return Err(ConnectionError::Lost {
                name: self.name.clone(),
            });
        };

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ConnectionError::NotFound {
                name: self.name.clone(),
                target: self.url.clone(),
            }),
            status => Err(ConnectionError::Status {
                name: self.name.clone(),
                url: self.url.clone(),
                status: status.as_u16(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.client = None;
        Ok(())
    }
}
