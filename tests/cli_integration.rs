//! CLI integration tests
//!
//! These run the built binary and check exit codes and output. Deployments
//! use `--source-dir` and `--dry-run` so nothing leaves the machine.

mod support;

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn siteforge_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_siteforge"))
}

fn run(work_dir: &Path, args: &[&str]) -> Output {
    Command::new(siteforge_bin())
        .args(args)
        .env("SITEFORGE_WORK_DIR", work_dir)
        .env("SITEFORGE_LOG_LEVEL", "warn")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute siteforge")
}

#[test]
fn test_cli_help() {
    let work = TempDir::new().unwrap();
    let output = run(work.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "deploy", "stacks", "whoami"] {
        assert!(stdout.contains(command), "help lacks {}", command);
    }
}

#[test]
fn test_cli_version() {
    let work = TempDir::new().unwrap();
    let output = run(work.path(), &["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_stacks_json() {
    let work = TempDir::new().unwrap();
    let output = run(work.path(), &["stacks", "--format", "json"]);

    assert!(output.status.success());
    let stacks: Value = serde_json::from_slice(&output.stdout).unwrap();
    let available: Vec<&str> = stacks["available"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(available.contains(&"static"));
    assert!(stacks["failures"].is_object());
}

#[test]
fn test_dry_run_deploy_from_source_dir() {
    let work = TempDir::new().unwrap();
    let repo = support::static_site(work.path());
    let output = run(
        &work.path().join("state"),
        &[
            "deploy",
            support::SITE_REPO,
            "--project",
            "acme-site",
            "--source-dir",
            repo.to_str().unwrap(),
            "--dry-run",
            "--format",
            "json",
        ],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let record: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "ready");
    assert_eq!(record["projectName"], "acme-site");
    assert_eq!(record["analysis"]["stackType"], "static");
    assert!(record["resourceNames"]["cdn"]
        .as_str()
        .unwrap()
        .starts_with("sf-acme-site-"));
}

#[test]
fn test_deploy_rejects_invalid_repository() {
    let work = TempDir::new().unwrap();
    let repo = support::static_site(work.path());
    let output = run(
        work.path(),
        &[
            "deploy",
            "ftp://github.com/acme/site",
            "--source-dir",
            repo.to_str().unwrap(),
            "--dry-run",
        ],
    );

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_invalid_config_exits_non_zero() {
    let work = TempDir::new().unwrap();
    let output = Command::new(siteforge_bin())
        .args(["deploy", support::SITE_REPO, "--dry-run"])
        .env("SITEFORGE_WORK_DIR", work.path())
        .env("SITEFORGE_RESOURCE_PREFIX", "NOT_VALID")
        .output()
        .expect("Failed to execute siteforge");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("SITEFORGE_"));
}
