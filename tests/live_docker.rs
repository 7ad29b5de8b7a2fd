//! End-to-end scenarios against a real Docker daemon.
//!
//! Ignored by default: they need a reachable daemon on the local socket
//! and the `python:3.11-alpine` image (pulled beforehand). Run with
//! `cargo test -- --ignored`.

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::ListContainersOptions;
use bollard::Docker;
use serde_json::json;

use docker_interpreter::config::Config;
use docker_interpreter::sandbox::{SandboxError, SandboxExecutor, SandboxRequest};
use docker_interpreter::skills::builtin::RunPythonSkill;
use docker_interpreter::skills::Skill;

const SOCKET: &str = "unix:///var/run/docker.sock";
const IMAGE: &str = "python:3.11-alpine";

fn executor() -> SandboxExecutor {
    SandboxExecutor::new(SOCKET, "png")
}

/// Counts containers (running or stopped) created by this engine.
async fn interpreter_container_count() -> usize {
    let docker = Docker::connect_with_unix(SOCKET, 10, bollard::API_DEFAULT_VERSION)
        .expect("daemon reachable");
    let mut filters = HashMap::new();
    filters.insert("name".to_string(), vec!["docker-interpreter-".to_string()]);
    let options = ListContainersOptions {
        all: true,
        filters,
        ..Default::default()
    };
    docker
        .list_containers(Some(options))
        .await
        .expect("list containers")
        .len()
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_simple_print() {
    let baseline = interpreter_container_count().await;

    let mut request = SandboxRequest::new("print(2+2)", IMAGE);
    request.timeout = Duration::from_secs(10);

    let result = executor().execute(&request).await.unwrap();
    assert!(result.log.contains('4'), "log was: {}", result.log);
    assert!(!result.timed_out);
    assert!(result.artifacts.is_empty());

    // Exactly one container created, exactly one removed
    assert_eq!(interpreter_container_count().await, baseline);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_timeout_returns_partial_log() {
    let baseline = interpreter_container_count().await;

    let code = "import time\nprint('started', flush=True)\ntime.sleep(5)\nprint('never')";
    let mut request = SandboxRequest::new(code, IMAGE);
    request.timeout = Duration::from_secs(2);

    let result = executor().execute(&request).await.unwrap();
    assert!(result.timed_out);
    assert!(result.log.contains("timed out"), "log was: {}", result.log);
    assert!(result.log.contains("started"));
    assert!(!result.log.contains("never"));

    // The force-stopped container must not linger
    assert_eq!(interpreter_container_count().await, baseline);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_reserved_option_creates_no_container() {
    let baseline = interpreter_container_count().await;

    let mut request = SandboxRequest::new("print(1)", IMAGE);
    request.options.insert("name".to_string(), json!("x"));

    match executor().execute(&request).await.unwrap_err() {
        SandboxError::Conflict { keys } => assert_eq!(keys, vec!["name"]),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(interpreter_container_count().await, baseline);
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_saved_image_is_harvested() {
    let code = "open('/tmp/plot_1.png', 'wb').write(b'\\x89PNG fake')\nprint('saved')";
    let mut request = SandboxRequest::new(code, IMAGE);
    request.timeout = Duration::from_secs(10);
    request.capture_artifacts = true;

    let result = executor().execute(&request).await.unwrap();
    assert!(result.log.contains("saved"));
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(result.artifacts[0].mime_type, "image/png");
    assert!(!result.artifacts[0].bytes.is_empty());
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_repeated_requests_use_distinct_containers() {
    let executor = executor();
    let request = SandboxRequest::new(
        "import socket\nprint(socket.gethostname())",
        IMAGE,
    );

    // The container hostname is its id; two runs must differ
    let first = executor.execute(&request).await.unwrap();
    let second = executor.execute(&request).await.unwrap();
    assert!(!first.log.trim().is_empty());
    assert_ne!(first.log.trim(), second.log.trim());
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_package_listing_enriches_description() {
    let mut skill = RunPythonSkill::new(&Config::default());
    assert!(!skill.description().contains("=="));

    skill.refresh_package_listing().await;
    // python:3.11-alpine ships at least pip and setuptools
    assert!(
        skill.description().contains("=="),
        "description was: {}",
        skill.description()
    );
}

#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn scenario_failing_script_completes_with_traceback() {
    let mut request = SandboxRequest::new("raise RuntimeError('boom')", IMAGE);
    request.timeout = Duration::from_secs(10);

    let result = executor().execute(&request).await.unwrap();
    assert!(!result.timed_out);
    assert!(result.log.contains("RuntimeError"), "log was: {}", result.log);
    assert!(result.log.contains("boom"));
}
