//! Container option validation and merging.
//!
//! Callers configure resource limits, network isolation, the working
//! directory and volume mounts. The engine controls everything that decides
//! *what* runs: the image, the entry command, the container name and the
//! stdin/detach wiring. Those keys are reserved — a request that tries to
//! set one is rejected before any container exists, with every conflicting
//! key listed in one report.
//!
//! Merging never mutates the caller's mapping: it produces a fresh
//! [`bollard::container::Config`] with the reserved values applied last, so
//! rejection stays the authoritative mechanism rather than "last write wins".

use std::collections::BTreeMap;

use bollard::container::Config;
use bollard::models::HostConfig;
use serde_json::Value;
use tracing::warn;

use super::error::SandboxError;

/// Caller-supplied container options, as parsed from `[docker.options]`.
pub type RunOptions = BTreeMap<String, Value>;

/// Option keys the engine must control. Sorted for stable reporting.
pub const RESERVED_OPTION_KEYS: [&str; 5] =
    ["command", "detach", "image", "name", "stdin_open"];

/// Checks the caller's options against the reserved set.
///
/// All conflicts are gathered eagerly so one failed request reports the
/// full set in a single pass. No side effects.
pub fn validate(options: &RunOptions) -> Result<(), SandboxError> {
    let conflicts: Vec<String> = RESERVED_OPTION_KEYS
        .iter()
        .filter(|key| options.contains_key(**key))
        .map(|key| key.to_string())
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(SandboxError::Conflict { keys: conflicts })
    }
}

/// Merges validated caller options with the engine-controlled values into
/// a fresh container configuration. Reserved values always win.
///
/// Recognized caller keys: `mem_limit` (size string or byte count),
/// `network_disabled` (bool), `working_dir` (string), `volumes` (array of
/// `host:container` bind strings). Anything else is logged and dropped.
pub fn merge(options: &RunOptions, image: &str, cmd: Vec<String>) -> Config<String> {
    let mut memory = None;
    let mut network_disabled = None;
    let mut working_dir = None;
    let mut binds = None;

    for (key, value) in options {
        match key.as_str() {
            "mem_limit" => match parse_mem_limit(value) {
                Some(bytes) => memory = Some(bytes),
                None => warn!("Ignoring unparseable mem_limit: {value}"),
            },
            "network_disabled" => match value.as_bool() {
                Some(flag) => network_disabled = Some(flag),
                None => warn!("Ignoring non-boolean network_disabled: {value}"),
            },
            "working_dir" => match value.as_str() {
                Some(dir) => working_dir = Some(dir.to_string()),
                None => warn!("Ignoring non-string working_dir: {value}"),
            },
            "volumes" => match parse_binds(value) {
                Some(list) => binds = Some(list),
                None => warn!("Ignoring malformed volumes entry: {value}"),
            },
            other => warn!("Ignoring unsupported docker option: {other}"),
        }
    }

    Config {
        image: Some(image.to_string()),
        cmd: Some(cmd),
        open_stdin: Some(true),
        network_disabled,
        working_dir,
        host_config: Some(HostConfig {
            memory,
            binds,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Parses a docker-style memory limit into bytes.
///
/// Accepts a plain byte count (`1048576`), or a string with a `b`/`k`/`m`/`g`
/// suffix (`"512m"`, `"1g"`, case-insensitive).
pub fn parse_mem_limit(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return (n > 0).then_some(n);
    }

    let s = value.as_str()?.trim().to_lowercase();
    let (digits, multiplier) = match s.chars().last()? {
        'b' => (&s[..s.len() - 1], 1),
        'k' => (&s[..s.len() - 1], 1024),
        'm' => (&s[..s.len() - 1], 1024 * 1024),
        'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        '0'..='9' => (s.as_str(), 1),
        _ => return None,
    };

    let n: i64 = digits.parse().ok()?;
    if n <= 0 {
        return None;
    }
    n.checked_mul(multiplier)
}

/// Extracts `host:container` bind strings from a JSON array.
fn parse_binds(value: &Value) -> Option<Vec<String>> {
    let entries = value.as_array()?;
    let mut binds = Vec::with_capacity(entries.len());
    for entry in entries {
        let bind = entry.as_str()?;
        if !bind.contains(':') {
            return None;
        }
        binds.push(bind.to_string());
    }
    Some(binds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(pairs: &[(&str, Value)]) -> RunOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ── validate ────────────────────────────────────────

    #[test]
    fn test_validate_empty_options() {
        assert!(validate(&RunOptions::new()).is_ok());
    }

    #[test]
    fn test_validate_disjoint_options() {
        let opts = options(&[
            ("mem_limit", json!("1g")),
            ("network_disabled", json!(true)),
            ("working_dir", json!("/mnt")),
        ]);
        assert!(validate(&opts).is_ok());
    }

    #[test]
    fn test_validate_single_conflict() {
        let opts = options(&[("name", json!("x"))]);
        match validate(&opts).unwrap_err() {
            SandboxError::Conflict { keys } => assert_eq!(keys, vec!["name"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_reports_all_conflicts_at_once() {
        let opts = options(&[
            ("image", json!("alpine")),
            ("command", json!("sh")),
            ("name", json!("x")),
            ("mem_limit", json!("1g")),
        ]);
        match validate(&opts).unwrap_err() {
            SandboxError::Conflict { keys } => {
                // Eager: every reserved collision listed, sorted
                assert_eq!(keys, vec!["command", "image", "name"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_detach_and_stdin_open_reserved() {
        let opts = options(&[("detach", json!(false)), ("stdin_open", json!(false))]);
        match validate(&opts).unwrap_err() {
            SandboxError::Conflict { keys } => {
                assert_eq!(keys, vec!["detach", "stdin_open"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_does_not_mutate_options() {
        let opts = options(&[("image", json!("alpine"))]);
        let before = opts.clone();
        let _ = validate(&opts);
        assert_eq!(opts, before);
    }

    // ── merge ───────────────────────────────────────────

    #[test]
    fn test_merge_reserved_values_always_win() {
        // Caller keys never reach the reserved fields even unvalidated
        let opts = options(&[("working_dir", json!("/mnt"))]);
        let cmd = vec!["python".to_string(), "/tmp/app.py".to_string()];
        let config = merge(&opts, "python:3.11-alpine", cmd.clone());

        assert_eq!(config.image.as_deref(), Some("python:3.11-alpine"));
        assert_eq!(config.cmd, Some(cmd));
        assert_eq!(config.open_stdin, Some(true));
        assert_eq!(config.working_dir.as_deref(), Some("/mnt"));
    }

    #[test]
    fn test_merge_translates_known_keys() {
        let opts = options(&[
            ("mem_limit", json!("1g")),
            ("network_disabled", json!(true)),
            ("volumes", json!(["/srv/shared:/mnt", "/data:/data"])),
        ]);
        let config = merge(&opts, "img", vec!["true".to_string()]);

        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(1024 * 1024 * 1024));
        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(
            host.binds,
            Some(vec!["/srv/shared:/mnt".to_string(), "/data:/data".to_string()])
        );
    }

    #[test]
    fn test_merge_unknown_keys_dropped() {
        let opts = options(&[("privileged", json!(true))]);
        let config = merge(&opts, "img", vec!["true".to_string()]);
        // Unknown keys never reach the container configuration
        assert_eq!(config.host_config.unwrap().memory, None);
    }

    #[test]
    fn test_merge_returns_new_value() {
        let opts = options(&[("mem_limit", json!("512m"))]);
        let before = opts.clone();
        let _ = merge(&opts, "img", vec!["true".to_string()]);
        assert_eq!(opts, before);
    }

    #[test]
    fn test_merge_malformed_values_ignored() {
        let opts = options(&[
            ("mem_limit", json!("lots")),
            ("network_disabled", json!("yes")),
            ("volumes", json!(["no-colon-here"])),
        ]);
        let config = merge(&opts, "img", vec!["true".to_string()]);
        let host = config.host_config.unwrap();
        assert_eq!(host.memory, None);
        assert_eq!(host.binds, None);
        assert_eq!(config.network_disabled, None);
    }

    // ── parse_mem_limit ─────────────────────────────────

    #[test]
    fn test_parse_mem_limit_suffixes() {
        assert_eq!(parse_mem_limit(&json!("1b")), Some(1));
        assert_eq!(parse_mem_limit(&json!("2k")), Some(2048));
        assert_eq!(parse_mem_limit(&json!("512m")), Some(512 * 1024 * 1024));
        assert_eq!(parse_mem_limit(&json!("1g")), Some(1024 * 1024 * 1024));
        assert_eq!(parse_mem_limit(&json!("1G")), Some(1024 * 1024 * 1024));
    }

    #[test]
    fn test_parse_mem_limit_plain_numbers() {
        assert_eq!(parse_mem_limit(&json!(1048576)), Some(1048576));
        assert_eq!(parse_mem_limit(&json!("1048576")), Some(1048576));
    }

    #[test]
    fn test_parse_mem_limit_rejects_garbage() {
        assert_eq!(parse_mem_limit(&json!("")), None);
        assert_eq!(parse_mem_limit(&json!("g")), None);
        assert_eq!(parse_mem_limit(&json!("1.5g")), None);
        assert_eq!(parse_mem_limit(&json!("-1g")), None);
        assert_eq!(parse_mem_limit(&json!(0)), None);
        assert_eq!(parse_mem_limit(&json!(-5)), None);
        assert_eq!(parse_mem_limit(&json!(true)), None);
    }

    #[test]
    fn test_parse_mem_limit_rejects_overflowing_counts() {
        assert_eq!(parse_mem_limit(&json!("9223372036854775807g")), None);
        assert_eq!(parse_mem_limit(&json!("9007199254740993k")), None);
        // Largest count that still fits with a gigabyte suffix.
        assert_eq!(
            parse_mem_limit(&json!("8589934591g")),
            Some(8_589_934_591 * 1024 * 1024 * 1024)
        );
    }
}
