use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DockerConfig {
    /// Docker endpoint. `unix://` sockets are the only well-tested mode;
    /// `http://` endpoints also work if the daemon exposes them.
    #[serde(default = "default_socket")]
    pub socket: String,
    /// Image the interpreter containers run.
    #[serde(default = "default_image")]
    pub image: String,
    /// Caller-suppliable container options (mem_limit, network_disabled,
    /// working_dir, volumes). Reserved keys are rejected at execution time.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InterpreterConfig {
    /// Hard deadline (seconds) for one code execution.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Shorter deadline for lightweight introspection runs (package listing).
    #[serde(default = "default_packages_timeout")]
    pub packages_timeout_seconds: u64,
    /// Extra text appended to the tool description shown to the LLM.
    #[serde(default)]
    pub additional_context: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactConfig {
    /// When false the plot-capture prelude is not injected and no
    /// artifacts are harvested.
    #[serde(default = "default_artifacts_enabled")]
    pub enabled: bool,
    /// Image extension harvested from the container (without the dot).
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Local directory where retrieved images are persisted.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// In-container directory scanned for generated images.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
}

fn default_socket() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_image() -> String {
    "python:3.11-alpine".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_packages_timeout() -> u64 {
    5
}

fn default_artifacts_enabled() -> bool {
    true
}

fn default_extension() -> String {
    "png".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache/artifacts")
}

fn default_artifact_dir() -> String {
    "/tmp".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            image: default_image(),
            options: BTreeMap::new(),
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            packages_timeout_seconds: default_packages_timeout(),
            additional_context: String::new(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: default_artifacts_enabled(),
            extension: default_extension(),
            cache_dir: default_cache_dir(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${DOCKER_HOST}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Human-readable description of the Docker endpoint and image
    pub fn docker_description(&self) -> String {
        format!("{} ({})", self.docker.image, self.docker.socket)
    }
}
