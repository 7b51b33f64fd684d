//! Routes and the centralized error handler.
use std::any::Any;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error};

use super::response::{ApiError, ApiResult, Envelope, Failure, serve_result};
use crate::{
    channel::ErrorReporter,
    error::{Error, ServerError},
};

/// Builds the API router: the built-in routes merged with `routes`, wrapped
/// so that every failure leaves as a JSON envelope.
pub fn router(routes: Router, reporter: ErrorReporter<Error>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .merge(routes)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(reporter, classify_errors))
}

async fn ping() -> ApiResult {
    serve_result("pong")
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let cause = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::internal(format!("handler panicked: {cause}")).into_response()
}

/// Rewrites every 4xx/5xx response into an error envelope.
///
/// Not-found and method-not-allowed become 404, everything else 500.
async fn classify_errors(
    State(reporter): State<ErrorReporter<Error>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let cause = response
        .extensions()
        .get::<Failure>()
        .map(|failure| failure.0.clone())
        .unwrap_or_else(|| status.to_string());

    let code = match status {
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
            debug!(path = %path, status = status.as_u16(), "not found: {cause}");
            StatusCode::NOT_FOUND
        }
        _ => {
            error!(path = %path, status = status.as_u16(), "request failed: {cause}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    match Envelope::error(code).encode(code) {
        Ok(response) => response,
        Err(err) => {
            reporter.report(ServerError::Respond(err.to_string()).into());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
