#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::{config_yaml, write_config};
use predicates::prelude::*;
use tempfile::tempdir;

fn servicekit() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("servicekit"));
    cmd.env("RUST_LOG", "info");
    cmd
}

#[test]
fn config_flag_is_required() {
    servicekit()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn version_names_the_service() {
    servicekit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("servicekit"));
}

#[test]
fn missing_config_file_fails() {
    let temp = tempdir().expect("failed to create tempdir");

    servicekit()
        .arg("--config")
        .arg(temp.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn unsupported_extension_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = write_config(temp.path(), "servicekit.toml", "[app]\nport = 8080\n");

    servicekit()
        .arg("-c")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config extension"));
}

#[test]
fn malformed_config_fails() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = write_config(temp.path(), "servicekit.yaml", "app: [port\n");

    servicekit()
        .arg("-c")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn print_outputs_effective_config_as_json() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = write_config(temp.path(), "servicekit.yaml", &config_yaml(18080));

    let output = servicekit()
        .arg("--config")
        .arg(&path)
        .arg("--print")
        .output()
        .expect("failed to run servicekit");
    assert!(output.status.success());

    let printed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout must be pure JSON");
    assert_eq!(printed["app"]["port"], 18080);
    assert_eq!(printed["app"]["check_connections_interval"], "1s");
    assert_eq!(printed["app"]["on_unhealthy"], "escalate");
    assert_eq!(printed["processes"]["ticker"]["start_interval"], "200ms");
}

#[test]
fn print_skips_validation() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = write_config(temp.path(), "servicekit.json", r#"{"app": {}}"#);

    servicekit()
        .arg("-c")
        .arg(&path)
        .arg("-p")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"port\": 0"));
}

#[test]
fn invalid_config_fails_before_starting() {
    let temp = tempdir().expect("failed to create tempdir");
    let path = write_config(
        temp.path(),
        "servicekit.yaml",
        "app:\n  check_connections_interval: 1s\n  error_buffer: 10\n",
    );

    servicekit()
        .arg("-c")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("app.port is empty"));
}

#[test]
fn unreachable_connection_fails_startup() {
    let temp = tempdir().expect("failed to create tempdir");
    let content = format!(
        "{}connections:\n  redis:\n    addr: \"127.0.0.1:1\"\n    timeout: 500ms\n",
        config_yaml(common::free_port())
    );
    let path = write_config(temp.path(), "servicekit.yaml", &content);

    servicekit()
        .arg("-c")
        .arg(&path)
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("init daemon"));
}
