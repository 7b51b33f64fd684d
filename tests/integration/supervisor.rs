#[path = "common/mod.rs"]
mod common;

use std::{
    process::{Command as StdCommand, Stdio},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use common::{config_yaml, free_port, http_get, wait_for_port, write_config};
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use servicekit::{
    channel::{ErrorReceiver, ErrorReporter, error_channel},
    config::Config,
    connector::{Connection, Connector, Endpoint},
    daemon::Daemon,
    error::{ConnectionError, Error, SupervisorError},
    logger::{LogLevel, Logger},
    resource::Resource,
    supervisor::{Supervisor, SupervisorConfig, UnhealthyPolicy},
};
use tempfile::tempdir;

fn logger() -> Logger {
    Logger::new("integration", "0.0.0", LogLevel::default())
        .with_fatal_hook(|msg| panic!("unexpected fatal: {msg}"))
}

fn supervisor() -> Supervisor {
    Supervisor::new(
        SupervisorConfig {
            check_interval: Duration::from_secs(60),
            error_buffer: 10,
            on_unhealthy: UnhealthyPolicy::Escalate,
        },
        logger(),
    )
}

/// Resource that counts lifecycle calls and can fail in the background.
struct Worker {
    name: &'static str,
    starts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    fail_after: Option<Duration>,
    reporter: ErrorReporter<Error>,
    errors: ErrorReceiver<Error>,
}

impl Worker {
    fn new(name: &'static str) -> Self {
        let (reporter, errors) = error_channel(name, 10, logger());
        Self {
            name,
            starts: Arc::default(),
            closes: Arc::default(),
            fail_after: None,
            reporter,
            errors,
        }
    }
}

#[async_trait]
impl Resource for Worker {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&mut self) -> Result<(), Error> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fail_after {
            let reporter = self.reporter.clone();
            let name = self.name;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                reporter.report(Error::process(name, "worker crashed"));
            });
        }
        Ok(())
    }

    fn errors(&mut self) -> Option<&mut ErrorReceiver<Error>> {
        Some(&mut self.errors)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn resource_error_is_returned_and_close_succeeds() {
    let mut worker = Worker::new("worker");
    worker.fail_after = Some(Duration::from_millis(50));
    let closes = Arc::clone(&worker.closes);

    let mut sup = supervisor();
    sup.register(Worker::new("http")).register(worker);

    let err = tokio::time::timeout(Duration::from_secs(5), sup.run())
        .await
        .expect("run must end on a resource error")
        .unwrap_err();

    match err {
        SupervisorError::Fatal(Error::Process { process, message }) => {
            assert_eq!(process, "worker");
            assert_eq!(message, "worker crashed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(sup.close().await.is_ok());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interrupt_returns_ok_and_closes_each_resource_once() {
    let workers: Vec<_> = ["http", "ticker", "connections"]
        .into_iter()
        .map(Worker::new)
        .collect();
    let counters: Vec<_> = workers
        .iter()
        .map(|w| (Arc::clone(&w.starts), Arc::clone(&w.closes)))
        .collect();

    let mut sup = supervisor();
    for worker in workers {
        sup.register(worker);
    }
    let handle = sup.handle();

    tokio::spawn(async move {
        while !handle.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.interrupt();
    });

    sup.run().await.unwrap();
    sup.close().await.unwrap();
    sup.close().await.unwrap();

    for (starts, closes) in counters {
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn stop_without_running_cycle_is_rejected() {
    let sup = supervisor();
    let handle = sup.handle();

    assert!(matches!(handle.stop(), Err(SupervisorError::NotRunning)));
    handle.interrupt();
    assert!(!handle.is_running());
}

struct Refusing;

#[async_trait]
impl Connector for Refusing {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError> {
        Err(ConnectionError::Lost {
            name: endpoint.name().to_string(),
        })
    }
}

#[tokio::test]
async fn daemon_build_fails_when_a_connection_cannot_open() {
    let mut config: Config = serde_yaml::from_str(&config_yaml(0)).unwrap();
    config.connections.postgres = Some(servicekit::config::TcpEndpointConfig {
        addr: "db:5432".into(),
        timeout: Duration::from_secs(1),
    });

    let err = match Daemon::build_with(&config, Arc::new(Refusing), logger()).await {
        Ok(_) => panic!("build must fail"),
        Err(err) => err,
    };
    assert_eq!(
        err.to_string(),
        "connector: open connections: postgres: connection is lost"
    );
}

#[test]
fn sigint_shuts_the_binary_down_gracefully() {
    let temp = tempdir().expect("failed to create tempdir");
    let port = free_port();
    let path = write_config(temp.path(), "servicekit.yaml", &config_yaml(port));

    let child = StdCommand::new(assert_cmd::cargo::cargo_bin!("servicekit"))
        .arg("--config")
        .arg(&path)
        .env("RUST_LOG", "info")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn servicekit");

    let ready = wait_for_port(port, Duration::from_secs(10));
    if !ready {
        let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
        panic!("servicekit never started listening on {port}");
    }

    let response = http_get(port, "/ping");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""result":"pong""#), "{response}");

    let missing = http_get(port, "/nope");
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");
    assert!(missing.contains(r#""errorCode":404"#), "{missing}");

    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).expect("failed to send SIGINT");
    let output = child.wait_with_output().expect("failed to wait for servicekit");
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "{stderr}");
    assert!(stderr.contains("start supervisor success"), "{stderr}");
    assert!(stderr.contains("stop http api success"), "{stderr}");
    assert!(stderr.contains("supervisor closed"), "{stderr}");
}
