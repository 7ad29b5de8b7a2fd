//! Sandboxed code execution in ephemeral Docker containers.
//!
//! One [`SandboxExecutor::execute`] call provisions a fresh container,
//! injects the untrusted source, runs it under a hard deadline, harvests
//! generated images, and removes the container on every code path.
//!
//! Flow: validate options → create + inject → start → wait (deadline) →
//! collect logs → extract artifacts → teardown. Steps are strictly
//! sequential; the Docker connection is shared across sequential calls
//! but each call owns its container exclusively.
//!
//! Only option conflicts and an unreachable daemon are reported as
//! errors. A timeout or an in-container failure still yields a
//! [`SandboxResult`] carrying whatever log output could be captured.

pub mod archive;
pub mod artifacts;
pub mod client;
pub mod error;
pub mod lifecycle;
pub mod options;

use std::time::Duration;

use bollard::Docker;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub use artifacts::Artifact;
pub use error::SandboxError;
pub use options::{RunOptions, RESERVED_OPTION_KEYS};

use lifecycle::{ContainerRun, WaitOutcome};

/// One code-execution request. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Source text to execute.
    pub code: String,
    /// Container image reference.
    pub image: String,
    /// Caller-supplied container options; must not touch reserved keys.
    pub options: RunOptions,
    /// Hard deadline for the wait step.
    pub timeout: Duration,
    /// Whether to harvest generated images after completion.
    pub capture_artifacts: bool,
    /// In-container directory scanned for artifacts.
    pub artifact_dir: String,
}

impl SandboxRequest {
    /// Request with default options: 120s deadline, no artifact capture,
    /// `/tmp` as the artifact directory.
    pub fn new(code: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            image: image.into(),
            options: RunOptions::new(),
            timeout: Duration::from_secs(120),
            capture_artifacts: false,
            artifact_dir: lifecycle::INJECT_DIR.to_string(),
        }
    }
}

/// Outcome of one execution. Always produced unless the request was
/// rejected up front ([`SandboxError::is_fatal`]).
#[derive(Debug, Clone)]
pub struct SandboxResult {
    /// Combined stdout/stderr; partial if the deadline fired.
    pub log: String,
    /// Harvested images, in archive entry order.
    pub artifacts: Vec<Artifact>,
    /// True when the deadline fired before the entry process exited.
    pub timed_out: bool,
}

/// Entry point for callers: owns the error classification and the
/// end-to-end deadline handling of one request/response cycle.
pub struct SandboxExecutor {
    endpoint: String,
    artifact_extension: String,
    docker: OnceCell<Docker>,
}

impl SandboxExecutor {
    pub fn new(endpoint: impl Into<String>, artifact_extension: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            artifact_extension: artifact_extension.into(),
            docker: OnceCell::new(),
        }
    }

    /// Returns the shared Docker client, connecting on first use.
    /// A failed attempt leaves the cell empty so the next call retries.
    async fn client(&self) -> Result<&Docker, SandboxError> {
        self.docker
            .get_or_try_init(|| client::connect(&self.endpoint))
            .await
    }

    /// Runs one request through the full cycle.
    ///
    /// Errors are limited to [`SandboxError::Conflict`] (checked before
    /// any container exists) and [`SandboxError::Connection`]. Everything
    /// later degrades into the returned [`SandboxResult`]: a timeout sets
    /// `timed_out` and prefixes the partial log, any other runtime failure
    /// prefixes the log with `Unexpected error:`. The container created
    /// for the request is removed in all cases.
    pub async fn execute(&self, request: &SandboxRequest) -> Result<SandboxResult, SandboxError> {
        options::validate(&request.options)?;
        let docker = self.client().await?;

        let container = match ContainerRun::create(docker, request).await {
            Ok(container) => container,
            Err(e) => {
                // Nothing ran, so there is no log to salvage
                return Ok(SandboxResult {
                    log: format!("Unexpected error: {e}"),
                    artifacts: Vec::new(),
                    timed_out: false,
                });
            }
        };

        debug!(
            "Executing {} byte(s) of code in {} (deadline {}s)",
            request.code.len(),
            request.image,
            request.timeout.as_secs()
        );

        let outcome = match container.start().await {
            Ok(()) => container.wait(request.timeout).await,
            Err(e) => WaitOutcome::Failed(e.to_string()),
        };

        // Partial output is valuable, collect it before anything else
        let raw_log = container.logs().await;

        let (log, timed_out, completed) = match outcome {
            WaitOutcome::Completed => (raw_log, false, true),
            WaitOutcome::TimedOut => (
                format!("Docker execution timed out. Partial output:\n{raw_log}"),
                true,
                false,
            ),
            WaitOutcome::Failed(msg) => {
                (format!("Unexpected error: {msg}\n{raw_log}"), false, false)
            }
        };

        // Harvest before teardown; skipped for interrupted runs
        let artifacts = if completed && request.capture_artifacts {
            artifacts::extract(
                docker,
                container.id(),
                &request.artifact_dir,
                &self.artifact_extension,
            )
            .await
        } else {
            Vec::new()
        };

        container.teardown().await;

        info!(
            "Execution finished: {} log byte(s), {} artifact(s), timed_out={timed_out}",
            log.len(),
            artifacts.len()
        );
        Ok(SandboxResult {
            log,
            artifacts,
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with_options(pairs: &[(&str, serde_json::Value)]) -> SandboxRequest {
        let mut request = SandboxRequest::new("print(1)", "python:3.11-alpine");
        request.options = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        request
    }

    #[test]
    fn test_request_defaults() {
        let request = SandboxRequest::new("print(1)", "python:3.11-alpine");
        assert_eq!(request.timeout, Duration::from_secs(120));
        assert!(!request.capture_artifacts);
        assert_eq!(request.artifact_dir, "/tmp");
        assert!(request.options.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_rejected_before_any_connection() {
        // The endpoint does not exist; a conflict must surface anyway,
        // proving validation runs before any runtime resource is touched.
        let executor = SandboxExecutor::new("unix:///nonexistent/docker.sock", "png");
        let request = request_with_options(&[("name", json!("x"))]);

        match executor.execute(&request).await.unwrap_err() {
            SandboxError::Conflict { keys } => assert_eq!(keys, vec!["name"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_connection_error() {
        let executor = SandboxExecutor::new("unix:///nonexistent/docker.sock", "png");
        let request = SandboxRequest::new("print(1)", "python:3.11-alpine");

        let err = executor.execute(&request).await.unwrap_err();
        assert!(matches!(err, SandboxError::Connection(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_connection_failure_retried_on_next_call() {
        let executor = SandboxExecutor::new("unix:///nonexistent/docker.sock", "png");
        let request = SandboxRequest::new("print(1)", "python:3.11-alpine");

        // The lazy client cell stays empty after a failed attempt
        assert!(executor.execute(&request).await.is_err());
        assert!(executor.execute(&request).await.is_err());
        assert!(executor.docker.get().is_none());
    }
}
