pub mod builtin;
pub mod registry;

use std::path::PathBuf;

use async_trait::async_trait;

/// Runtime context passed to skill execution.
///
/// Carries the invoking conversation and the artifact cache location so
/// skills can persist generated files per deployment.
pub struct SkillContext {
    /// Opaque identifier of the conversation the invocation belongs to.
    pub conversation_id: String,
    /// Base directory for persisted artifacts (images, files).
    pub cache_dir: PathBuf,
}

/// A skill that the LLM can invoke via tool_use.
///
/// The host calls `execute()` when the LLM requests a tool_use.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Unique identifier used in the host's tool array.
    /// Must be lowercase alphanumeric + underscores (e.g. "run_python_code").
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM so it knows
    /// when to invoke this skill.
    fn description(&self) -> &str;

    /// JSON Schema describing the parameters this skill accepts.
    /// Used as the `input_schema` field of the tool definition.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Required capabilities (validated at startup, not yet enforced).
    /// Examples: "docker:unix:///var/run/docker.sock", "filesystem:/tmp:read"
    fn capabilities(&self) -> Vec<String> {
        vec![]
    }

    /// Execute the skill with the given parameters and return a text result.
    /// The returned string is sent back to the LLM as a `tool_result`.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &SkillContext,
    ) -> anyhow::Result<String>;
}

pub use registry::{SkillRegistry, ToolDefinition};
