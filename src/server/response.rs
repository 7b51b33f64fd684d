use std::fmt;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON body of every API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "errorCode")]
    pub error_code: u16,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl Envelope {
    /// Successful envelope: code 0, empty message.
    pub fn ok(result: Value) -> Self {
        Self {
            error_code: 0,
            error_message: String::new(),
            result,
            count: None,
        }
    }

    /// Error envelope carrying the status code and its canonical reason.
    pub fn error(status: StatusCode) -> Self {
        Self {
            error_code: status.as_u16(),
            error_message: status.canonical_reason().unwrap_or_default().to_string(),
            result: Value::Null,
            count: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Encodes the envelope as a JSON response with the given status line.
    pub fn encode(&self, status: StatusCode) -> Result<Response, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
    }
}

/// Result type returned by API handlers.
pub type ApiResult = Result<Response, ApiError>;

/// Wraps `result` in a successful envelope.
pub fn serve_result<T: Serialize>(result: T) -> ApiResult {
    let value = serde_json::to_value(result).map_err(ApiError::internal)?;
    Envelope::ok(value)
        .encode(StatusCode::OK)
        .map_err(ApiError::internal)
}

/// Like [`serve_result`] for list results, adding the item count.
pub fn serve_list<T: Serialize>(items: &[T]) -> ApiResult {
    let value = serde_json::to_value(items).map_err(ApiError::internal)?;
    Envelope::ok(value)
        .with_count(items.len() as u64)
        .encode(StatusCode::OK)
        .map_err(ApiError::internal)
}

/// Handler failure. Only the status reaches the client; the cause is logged
/// by the error middleware.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    cause: String,
}

impl ApiError {
    pub fn not_found(cause: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            cause: cause.to_string(),
        }
    }

    pub fn internal(cause: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            cause: cause.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        if err.is_not_found() {
            Self::not_found(err)
        } else {
            Self::internal(err)
        }
    }
}

/// Internal cause attached to an error response for the middleware to log.
#[derive(Debug, Clone)]
pub(crate) struct Failure(pub(crate) String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(Failure(self.cause));
        response
    }
}
