//! Builtin skill: execute Python code in an ephemeral Docker container.
//!
//! The LLM invokes this tool to run data-analysis or scripting snippets.
//! The code runs non-interactively inside a fresh container with a hard
//! deadline; combined stdout/stderr and any matplotlib figures saved by
//! the plot-capture prelude are returned to the LLM, and the figures are
//! persisted to the local artifact cache.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{ArtifactConfig, Config};
use crate::sandbox::{RunOptions, SandboxError, SandboxExecutor, SandboxRequest};
use crate::skills::{Skill, SkillContext};

/// Introspection snippet listing the installed distributions, one
/// `name==version` per line.
const LIST_PACKAGES_SNIPPET: &str = "\
import importlib.metadata
for dist in importlib.metadata.distributions():
    print(f\"{dist.metadata['Name']}=={dist.version}\")
";

/// Python prelude registering an exit hook that saves every open
/// matplotlib figure into the artifact directory. Prepended to the user
/// code before injection; a plain code transform, the engine never sees
/// the difference.
fn plot_capture_prelude(artifact_dir: &str, extension: &str) -> String {
    format!(
        r#"import atexit

def _save_open_figures():
    try:
        import matplotlib
        import matplotlib.pyplot as plt
    except ImportError:
        return
    for num in plt.get_fignums():
        try:
            plt.figure(num).savefig("{artifact_dir}/plot_" + str(num) + ".{extension}")
        except Exception:
            pass

atexit.register(_save_open_figures)

"#
    )
}

/// Prepends the plot-capture prelude to the user code.
fn wrap_with_plot_capture(code: &str, artifact_dir: &str, extension: &str) -> String {
    let mut wrapped = plot_capture_prelude(artifact_dir, extension);
    wrapped.push_str(code);
    wrapped
}

/// Builds the tool description shown to the LLM.
fn build_description(packages: &str, additional_context: &str) -> String {
    let mut description = String::from(
        "Executes the given Python code in an isolated container and returns \
         the combined standard output and standard error. It's executed in \
         non-interactive mode so everything has to be explicitly printed to \
         stdout to be seen. Files referenced without an absolute path are \
         relative to the current working directory.",
    );

    if !packages.is_empty() {
        description.push_str(
            "\n\nIn addition to the standard library, these packages are available:\n\n",
        );
        description.push_str(packages);
    }

    if !additional_context.is_empty() {
        description.push_str("\n\n");
        description.push_str(additional_context);
    }

    description
}

/// Formats the execution report returned to the LLM: the executed code,
/// the captured output (which carries its own timeout marker when the
/// deadline fired), and references to the persisted images.
fn format_result(code: &str, log: &str, artifact_paths: &[String]) -> String {
    let mut output = format!(
        "Execution: {}\n\nExecuted code:\n```python\n{}\n```\n\nOutput:\n```\n{}\n```\n",
        chrono::Local::now().to_rfc3339(),
        code.trim_end(),
        log.trim_end(),
    );

    if !artifact_paths.is_empty() {
        output.push_str("\nGenerated images:\n");
        for path in artifact_paths {
            output.push_str(&format!("![generated plot]({path})\n"));
        }
    }

    output
}

/// Builtin skill that runs Python code in a sandboxed container.
pub struct RunPythonSkill {
    executor: SandboxExecutor,
    image: String,
    socket: String,
    options: RunOptions,
    timeout: Duration,
    packages_timeout: Duration,
    artifacts: ArtifactConfig,
    additional_context: String,
    description: String,
}

impl RunPythonSkill {
    pub fn new(config: &Config) -> Self {
        Self {
            executor: SandboxExecutor::new(
                config.docker.socket.clone(),
                config.artifacts.extension.clone(),
            ),
            image: config.docker.image.clone(),
            socket: config.docker.socket.clone(),
            options: config.docker.options.clone(),
            timeout: Duration::from_secs(config.interpreter.timeout_seconds),
            packages_timeout: Duration::from_secs(config.interpreter.packages_timeout_seconds),
            artifacts: config.artifacts.clone(),
            additional_context: config.interpreter.additional_context.clone(),
            description: build_description("", &config.interpreter.additional_context),
        }
    }

    /// Lists the distributions installed in the configured image by
    /// running the introspection snippet under the short deadline.
    pub async fn installed_packages(&self) -> anyhow::Result<String> {
        let mut request = SandboxRequest::new(LIST_PACKAGES_SNIPPET, self.image.as_str());
        request.options = self.options.clone();
        request.timeout = self.packages_timeout;

        let result = self.executor.execute(&request).await?;
        Ok(result.log)
    }

    /// Queries the image for its installed packages and folds the listing
    /// into the tool description. Failures leave the description as-is:
    /// the tool works without the package list, it is just less helpful.
    ///
    /// Embedding hosts are expected to call this once during skill setup,
    /// before handing the tool description to the LLM. The one-shot CLI
    /// skips it since the description is never shown there.
    pub async fn refresh_package_listing(&mut self) {
        match self.installed_packages().await {
            Ok(packages) => {
                debug!(
                    "Package listing for {}: {} byte(s)",
                    self.image,
                    packages.len()
                );
                self.description =
                    build_description(packages.trim(), &self.additional_context);
            }
            Err(e) => warn!("Package introspection failed, keeping bare description: {e}"),
        }
    }

    /// Runs `code` end to end and returns the formatted execution report.
    /// Fatal engine errors (unreachable daemon, reserved option keys)
    /// surface as `Err` so a CLI caller can exit non-zero;
    /// `Skill::execute` folds them into tool text instead.
    pub async fn run(
        &self,
        code: &str,
        context: &SkillContext,
    ) -> Result<String, SandboxError> {
        let request = self.build_request(code);
        let result = self.executor.execute(&request).await?;

        let mut artifact_paths = Vec::new();
        for artifact in &result.artifacts {
            match artifact.store(&context.cache_dir) {
                Ok(path) => artifact_paths.push(path.display().to_string()),
                Err(e) => warn!("Failed to persist artifact: {e}"),
            }
        }

        // The report shows the user's code, not the injected prelude
        Ok(format_result(code, &result.log, &artifact_paths))
    }

    fn build_request(&self, code: &str) -> SandboxRequest {
        let source = if self.artifacts.enabled {
            wrap_with_plot_capture(code, &self.artifacts.artifact_dir, &self.artifacts.extension)
        } else {
            code.to_string()
        };

        let mut request = SandboxRequest::new(source, self.image.as_str());
        request.options = self.options.clone();
        request.timeout = self.timeout;
        request.capture_artifacts = self.artifacts.enabled;
        request.artifact_dir = self.artifacts.artifact_dir.clone();
        request
    }
}

#[async_trait]
impl Skill for RunPythonSkill {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute as a string."
                }
            },
            "required": ["code"]
        })
    }

    fn capabilities(&self) -> Vec<String> {
        vec![format!("docker:{}", self.socket)]
    }

    async fn execute(
        &self,
        params: Value,
        context: &SkillContext,
    ) -> anyhow::Result<String> {
        let code = params["code"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: code"))?;

        debug!(
            "Running {} byte(s) of Python for conversation {}",
            code.len(),
            context.conversation_id
        );

        match self.run(code, context).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Code execution failed: {e}");
                Ok(format!("Code execution failed: {e}"))
            }
        }
    }
}
