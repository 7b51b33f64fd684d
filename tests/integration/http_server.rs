use std::time::{Duration, Instant};

use axum::{Router, routing::get};
use servicekit::{
    error::{Error, ServerError},
    logger::{LogLevel, Logger},
    server::{ApiResult, Envelope, HttpServer, ServerConfig, ServerState, serve_result},
};
use tokio::net::TcpListener;

fn server(shutdown_timeout: Duration) -> HttpServer {
    let logger = Logger::new("integration", "0.0.0", LogLevel::default());
    HttpServer::new(
        ServerConfig {
            port: 0,
            shutdown_timeout,
            error_buffer: 10,
        },
        logger,
    )
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

#[tokio::test]
async fn close_without_serving_is_locked() {
    let mut server = server(Duration::from_secs(1));

    assert!(matches!(server.close().await, Err(ServerError::Locked)));
    assert!(matches!(server.close().await, Err(ServerError::Locked)));
    assert_eq!(server.state(), ServerState::Created);
}

#[tokio::test]
async fn serves_envelopes_and_stops_within_the_deadline() {
    let mut server = server(Duration::from_secs(2));
    let (listener, base) = listener().await;
    server.serve_listener(listener);

    let pong: Envelope = reqwest::get(format!("{base}/ping"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pong.error_code, 0);
    assert_eq!(pong.result, serde_json::json!("pong"));

    let response = reqwest::get(format!("{base}/no/such/route")).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let missing: Envelope = response.json().await.unwrap();
    assert_eq!(missing.error_code, 404);
    assert_eq!(missing.error_message, "Not Found");

    let started = Instant::now();
    server.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.state(), ServerState::Stopped);

    assert!(matches!(server.close().await, Err(ServerError::Locked)));
    assert!(reqwest::get(format!("{base}/ping")).await.is_err());
}

#[tokio::test]
async fn bind_failure_arrives_on_the_error_channel() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut server = server(Duration::from_secs(1));
    server.serve(port);

    let err = tokio::time::timeout(Duration::from_secs(2), server.errors().recv())
        .await
        .expect("bind failure must be reported")
        .unwrap();
    assert!(matches!(err, Error::Server(ServerError::Start(_))), "{err}");

    server.close().await.unwrap();
    drop(occupied);
}

#[tokio::test]
async fn missed_deadline_forces_close_and_is_reported() {
    async fn slow() -> ApiResult {
        tokio::time::sleep(Duration::from_secs(5)).await;
        serve_result("too late")
    }

    let mut server = server(Duration::from_millis(200))
        .with_routes(Router::new().route("/slow", get(slow)));
    let (listener, base) = listener().await;
    server.serve_listener(listener);

    let pending = tokio::spawn(reqwest::get(format!("{base}/slow")));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let err = server.errors().try_recv().expect("timeout must be reported");
    assert!(
        matches!(err, Error::Server(ServerError::ShutdownTimeout(_))),
        "{err}"
    );
    pending.abort();
}
