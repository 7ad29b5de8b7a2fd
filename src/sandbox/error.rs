//! Error taxonomy for the execution engine.
//!
//! Only `Conflict` and `Connection` ever escape
//! [`SandboxExecutor::execute`](crate::sandbox::SandboxExecutor::execute):
//! both are detected before (or while) reaching the Docker daemon, so no
//! container exists and there is nothing to report back. Everything that
//! happens after container creation — deadline expiry, a failed start, an
//! OOM kill — degrades into a [`SandboxResult`](crate::sandbox::SandboxResult)
//! carrying whatever log output could be captured.

use std::fmt;

#[derive(Debug)]
pub enum SandboxError {
    /// Caller-supplied container options collide with keys the engine
    /// controls. Holds every conflicting key, sorted.
    Conflict { keys: Vec<String> },
    /// The Docker endpoint could not be reached. Fatal, not retried.
    Connection(String),
    /// Create/start/wait failed after the container options were accepted.
    /// Internal only: the executor folds this into a degraded result.
    Runtime(String),
}

impl SandboxError {
    /// True for errors that prevent a result from being produced.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Connection(_))
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { keys } => write!(
                f,
                "docker args conflict, these can't be set by user: {}",
                keys.join(", ")
            ),
            Self::Connection(msg) => {
                write!(f, "Failed to connect to Docker socket: {msg}")
            }
            Self::Runtime(msg) => write!(f, "Container runtime error: {msg}"),
        }
    }
}

impl std::error::Error for SandboxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_lists_all_keys() {
        let err = SandboxError::Conflict {
            keys: vec!["image".to_string(), "name".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("image"));
        assert!(msg.contains("name"));
        assert!(msg.contains("can't be set by user"));
    }

    #[test]
    fn test_connection_display() {
        let err = SandboxError::Connection("No such file or directory".to_string());
        assert!(err.to_string().contains("Failed to connect to Docker socket"));
        assert!(err.to_string().contains("No such file or directory"));
    }

    #[test]
    fn test_fatality() {
        assert!(SandboxError::Conflict { keys: vec![] }.is_fatal());
        assert!(SandboxError::Connection("x".into()).is_fatal());
        assert!(!SandboxError::Runtime("x".into()).is_fatal());
    }
}
