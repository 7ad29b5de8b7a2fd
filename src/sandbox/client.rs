//! Connection handling for the Docker Engine API.
//!
//! A thin wrapper around [`bollard::Docker`]: picks the transport from the
//! configured endpoint and reports unreachable daemons as
//! [`SandboxError::Connection`]. The returned client is cheap to clone and
//! may be reused across sequential executions.

use bollard::Docker;
use tracing::debug;

use super::error::SandboxError;

/// Default per-request timeout of the HTTP client itself, in seconds.
/// Generous on purpose: the engine enforces its own execution deadline
/// around the wait call, this only bounds individual API round-trips.
const API_TIMEOUT_SECS: u64 = 600;

/// Connects to the Docker endpoint given as a URL.
///
/// `unix://` endpoints use the local socket transport, anything else is
/// handed to the HTTP transport. The connection is lazy in bollard, so a
/// `version` ping is issued here to surface an unreachable daemon early,
/// before any container is created.
pub async fn connect(endpoint: &str) -> Result<Docker, SandboxError> {
    let docker = if endpoint.starts_with("unix://") {
        Docker::connect_with_unix(endpoint, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(endpoint, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    }
    .map_err(|e| SandboxError::Connection(e.to_string()))?;

    docker
        .version()
        .await
        .map_err(|e| SandboxError::Connection(e.to_string()))?;

    debug!("Connected to Docker endpoint {endpoint}");
    Ok(docker)
}
