use std::io::Read;

use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docker_interpreter::config::Config;
use docker_interpreter::skills::builtin::RunPythonSkill;
use docker_interpreter::skills::SkillContext;

fn print_help() {
    println!(
        "\
docker-interpreter v{}

Runs Python code in an ephemeral Docker container and prints the result.

USAGE:
    docker-interpreter [OPTIONS] [SCRIPT]

ARGUMENTS:
    SCRIPT    Path to a Python file, or '-' to read from stdin [default: -]

OPTIONS:
    -c, --config PATH    Path to TOML configuration file
                         [default: config/interpreter.toml]
        --packages       Print the packages installed in the configured
                         image and exit
    -h, --help           Print this help message and exit
    -V, --version        Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG      Log level filter for tracing
                  (e.g. debug, docker_interpreter=debug,warn)
    DOCKER_HOST   Commonly referenced as the [docker] socket value

EXAMPLES:
    docker-interpreter script.py                 # run a file
    echo 'print(2+2)' | docker-interpreter       # run stdin
    docker-interpreter --packages                # list installed packages",
        env!("CARGO_PKG_VERSION"),
    );
}

struct CliArgs {
    config_path: String,
    script: String,
    list_packages: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut config_path = "config/interpreter.toml".to_string();
    let mut script = None;
    let mut list_packages = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("docker-interpreter v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a path argument"))?;
            }
            "--packages" => list_packages = true,
            other if other.starts_with('-') && other != "-" => {
                return Err(anyhow!("Unknown option: {other} (see --help)"));
            }
            other => {
                if script.replace(other.to_string()).is_some() {
                    return Err(anyhow!("Only one SCRIPT argument is accepted"));
                }
            }
        }
    }

    Ok(CliArgs {
        config_path,
        script: script.unwrap_or_else(|| "-".to_string()),
        list_packages,
    })
}

/// Reads the code to execute from the script path or stdin.
fn read_code(script: &str) -> Result<String> {
    if script == "-" {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        Ok(code)
    } else {
        Ok(std::fs::read_to_string(script)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docker_interpreter=info")),
        )
        .init();

    // A missing config file is fine, defaults cover local use
    let config = match Config::load(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            info!(
                "Could not load {} ({e}), using built-in defaults",
                args.config_path
            );
            Config::default()
        }
    };

    info!("Docker: {}", config.docker_description());
    info!(
        "Timeout: {}s (packages: {}s)",
        config.interpreter.timeout_seconds, config.interpreter.packages_timeout_seconds
    );
    info!(
        "Artifacts: {} (.{} from {})",
        if config.artifacts.enabled { "enabled" } else { "disabled" },
        config.artifacts.extension,
        config.artifacts.artifact_dir
    );

    let skill = RunPythonSkill::new(&config);

    if args.list_packages {
        let packages = skill.installed_packages().await?;
        print!("{packages}");
        return Ok(());
    }

    let code = read_code(&args.script)?;
    if code.trim().is_empty() {
        return Err(anyhow!("No code to execute"));
    }

    let context = SkillContext {
        conversation_id: "cli".to_string(),
        cache_dir: config.artifacts.cache_dir.clone(),
    };

    // Fatal engine errors (unreachable daemon, reserved option keys)
    // propagate here and exit non-zero; timeouts and script failures are
    // part of the report and exit zero.
    let result = skill.run(&code, &context).await?;

    println!("{result}");
    Ok(())
}
