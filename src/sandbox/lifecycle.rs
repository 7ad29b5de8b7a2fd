//! Ephemeral container lifecycle: create, inject, start, wait, teardown.
//!
//! One [`ContainerRun`] wraps exactly one container. The container is
//! created in a stopped state, the source archive is written into its
//! filesystem, and only then is the entry process started. Whatever
//! happens afterwards — completion, deadline expiry, a daemon error —
//! [`ContainerRun::teardown`] removes the container, and teardown itself
//! is bounded by a second, shorter deadline so it cannot hang.

use std::time::Duration;

use bollard::container::{
    CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::ContainerWaitResponse;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::archive::pack_source;
use super::error::SandboxError;
use super::options;
use super::SandboxRequest;

/// In-container directory the source archive is unpacked into.
pub const INJECT_DIR: &str = "/tmp";

/// File name of the injected script; the entry command references it.
pub const ENTRY_FILE: &str = "app.py";

/// Prefix of generated container names; the suffix is a UUID so that
/// concurrent executions can never collide.
const NAME_PREFIX: &str = "docker-interpreter-";

/// Grace period (seconds) given to the entry process on forced stop.
const STOP_GRACE_SECS: i64 = 1;

/// Upper bound on the whole stop-and-remove step.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal state of the wait step.
#[derive(Debug, PartialEq)]
pub enum WaitOutcome {
    /// The entry process exited (any exit code).
    Completed,
    /// The deadline fired before the process exited.
    TimedOut,
    /// The daemon reported an error while running the container.
    Failed(String),
}

/// Generates a unique container name.
fn container_name() -> String {
    format!("{NAME_PREFIX}{}", Uuid::new_v4())
}

/// The entry command launched inside the container, referencing the
/// exact path the archive was unpacked to.
fn entry_command() -> Vec<String> {
    vec!["python".to_string(), format!("{INJECT_DIR}/{ENTRY_FILE}")]
}

/// Classifies one item of the wait stream.
///
/// bollard surfaces a non-zero exit code as `DockerContainerWaitError`;
/// that is still a completed run — the log carries the failure text and
/// the caller wants to see it.
fn classify_wait(item: Option<Result<ContainerWaitResponse, DockerError>>) -> WaitOutcome {
    match item {
        Some(Ok(_)) => WaitOutcome::Completed,
        Some(Err(DockerError::DockerContainerWaitError { code, .. })) => {
            debug!("Container exited with status {code}");
            WaitOutcome::Completed
        }
        Some(Err(e)) => WaitOutcome::Failed(e.to_string()),
        None => WaitOutcome::Failed("wait stream ended unexpectedly".to_string()),
    }
}

/// A single created container, guaranteed removable.
pub struct ContainerRun<'d> {
    docker: &'d Docker,
    id: String,
    name: String,
}

impl<'d> ContainerRun<'d> {
    /// Creates the container in a stopped state and injects the source
    /// archive into its filesystem. The entry process is not launched.
    ///
    /// If injection fails after the container was created, the container
    /// is removed before the error is returned, so no path leaks one.
    pub async fn create(
        docker: &'d Docker,
        request: &SandboxRequest,
    ) -> Result<ContainerRun<'d>, SandboxError> {
        let name = container_name();
        let config = options::merge(&request.options, &request.image, entry_command());

        let create_options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };
        let created = docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| SandboxError::Runtime(format!("create failed: {e}")))?;

        for warning in &created.warnings {
            warn!("Docker create warning for {name}: {warning}");
        }
        debug!("Created container {name} ({})", created.id);

        let run = ContainerRun {
            docker,
            id: created.id,
            name,
        };

        if let Err(e) = run.inject(&request.code).await {
            run.teardown().await;
            return Err(e);
        }
        Ok(run)
    }

    /// Docker-assigned container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Packs the source as a single-file tar archive and writes it under
    /// [`INJECT_DIR`] in the not-yet-started container. Calling this again
    /// overwrites the file.
    async fn inject(&self, source: &str) -> Result<(), SandboxError> {
        let archive = pack_source(source, ENTRY_FILE)?;
        let upload_options = UploadToContainerOptions::<String> {
            path: INJECT_DIR.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(&self.id, Some(upload_options), archive.into())
            .await
            .map_err(|e| SandboxError::Runtime(format!("code injection failed: {e}")))
    }

    /// Launches the entry process.
    pub async fn start(&self) -> Result<(), SandboxError> {
        self.docker
            .start_container(&self.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Runtime(format!("start failed: {e}")))
    }

    /// Blocks until the container reaches a terminal state or `deadline`
    /// elapses, whichever comes first. The deadline is authoritative: once
    /// it fires the engine proceeds to forced teardown regardless of how
    /// responsive the daemon is.
    pub async fn wait(&self, deadline: Duration) -> WaitOutcome {
        let mut stream = self
            .docker
            .wait_container(&self.id, None::<WaitContainerOptions<String>>);

        match tokio::time::timeout(deadline, stream.next()).await {
            Ok(item) => classify_wait(item),
            Err(_) => {
                warn!(
                    "Container {} exceeded the {}s deadline",
                    self.name,
                    deadline.as_secs()
                );
                WaitOutcome::TimedOut
            }
        }
    }

    /// Collects the combined stdout/stderr stream, lossily decoded.
    /// Best-effort: a partial log is returned if the stream errors midway.
    pub async fn logs(&self) -> String {
        let log_options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(&self.id, Some(log_options));

        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => buf.extend_from_slice(&output.into_bytes()),
                Err(e) => {
                    warn!("Log collection from {} interrupted: {e}", self.name);
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Stops (1s grace) and force-removes the container.
    ///
    /// Guaranteed final step of every code path. Failures here are logged
    /// and swallowed so they never mask the main outcome, and the whole
    /// step is bounded by [`TEARDOWN_TIMEOUT`].
    pub async fn teardown(self) {
        let bounded = tokio::time::timeout(TEARDOWN_TIMEOUT, async {
            let stop_options = StopContainerOptions { t: STOP_GRACE_SECS };
            if let Err(e) = self.docker.stop_container(&self.id, Some(stop_options)).await {
                // 304: already stopped, expected after normal completion
                if !matches!(
                    e,
                    DockerError::DockerResponseServerError {
                        status_code: 304,
                        ..
                    }
                ) {
                    warn!("Failed to stop container {}: {e}", self.name);
                }
            }

            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            match self
                .docker
                .remove_container(&self.id, Some(remove_options))
                .await
            {
                Ok(()) => debug!("Removed container {}", self.name),
                Err(e) => warn!("Failed to remove container {}: {e}", self.name),
            }
        })
        .await;

        if bounded.is_err() {
            warn!(
                "Teardown of container {} still hanging after {}s, abandoning",
                self.name,
                TEARDOWN_TIMEOUT.as_secs()
            );
        }
    }
}
