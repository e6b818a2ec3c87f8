//! Integration tests for the folio-offline binary
//!
//! Everything here runs without a reachable origin: the offline cases point
//! the worker at a closed local port.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Origin nothing listens on
const DEAD_ORIGIN: &str = "http://127.0.0.1:9";

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_folio-offline"))
        .args(args)
        .output()
        .expect("Failed to execute folio-offline")
}

fn dir_arg(dir: &Path) -> String {
    dir.to_string_lossy().to_string()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("folio-offline"));
    assert!(stdout.contains("install"));
    assert!(stdout.contains("fetch"));
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_config_file_prints_error() {
    let output = run_cli(&["status", "--config", "/nonexistent/worker.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to read config file"),
        "Should explain the config error: {}",
        stderr
    );
}

#[test]
fn test_invalid_origin_prints_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache_dir = dir_arg(temp_dir.path());
    let output = run_cli(&["status", "--origin", "ftp://example.com", "--cache-dir", &cache_dir]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid origin"), "stderr: {}", stderr);
}

#[test]
fn test_status_on_empty_cache() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&["status", "--cache-dir", &cache_dir]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No cache buckets"));
}

#[test]
fn test_status_marks_current_and_stale_buckets() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    fs::create_dir_all(temp_dir.path().join("portfolio-cache-v1")).unwrap();
    fs::create_dir_all(temp_dir.path().join("portfolio-cache-v0")).unwrap();
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&["status", "--cache-dir", &cache_dir]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let current = stdout
        .lines()
        .find(|l| l.contains("portfolio-cache-v1"))
        .expect("Current bucket should be listed");
    let stale = stdout
        .lines()
        .find(|l| l.contains("portfolio-cache-v0"))
        .expect("Stale bucket should be listed");
    assert!(current.starts_with('*'));
    assert!(stale.starts_with("stale"));
}

#[test]
fn test_clear_removes_only_app_buckets() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    fs::create_dir_all(temp_dir.path().join("portfolio-cache-v1")).unwrap();
    fs::create_dir_all(temp_dir.path().join("portfolio-cache-v0")).unwrap();
    fs::create_dir_all(temp_dir.path().join("someone-else")).unwrap();
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&["clear", "--cache-dir", &cache_dir]);

    assert!(output.status.success());
    assert!(!temp_dir.path().join("portfolio-cache-v1").exists());
    assert!(!temp_dir.path().join("portfolio-cache-v0").exists());
    assert!(temp_dir.path().join("someone-else").exists());
}

#[test]
fn test_install_offline_still_completes() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    fs::create_dir_all(temp_dir.path().join("portfolio-cache-v0")).unwrap();
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&[
        "install",
        "--origin",
        DEAD_ORIGIN,
        "--cache-dir",
        &cache_dir,
        "--timeout",
        "5",
    ]);

    assert!(output.status.success(), "Install must not fail offline");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Installed portfolio-cache-v1: 0 cached, 6 failed"), "stdout: {}", stdout);
    assert!(stdout.contains("Activated portfolio-cache-v1"));
    assert!(temp_dir.path().join("portfolio-cache-v1").is_dir());
    assert!(!temp_dir.path().join("portfolio-cache-v0").exists());
}

#[test]
fn test_fetch_offline_serves_fallback() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&[
        "fetch",
        "assets/index.js",
        "about",
        "--origin",
        DEAD_ORIGIN,
        "--cache-dir",
        &cache_dir,
        "--timeout",
        "5",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let asset = stdout
        .lines()
        .find(|l| l.contains("/assets/index.js"))
        .expect("Asset line should be printed");
    assert!(asset.starts_with("408 fallback"), "line: {}", asset);
    assert!(stdout.contains("passthrough failed"), "stdout: {}", stdout);
}

#[test]
fn test_fetch_rejects_invalid_method() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache_dir = dir_arg(temp_dir.path());

    let output = run_cli(&[
        "fetch",
        "assets/index.js",
        "--method",
        "GE T",
        "--origin",
        DEAD_ORIGIN,
        "--cache-dir",
        &cache_dir,
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid method"), "stderr: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use folio_offline::cli::{parse_method, Cli, Command};

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["folio-offline", "status"]);
        assert_eq!(cli.command, Command::Status);
    }

    #[test]
    fn test_cli_parse_fetch_with_method() {
        let cli = Cli::parse_from(["folio-offline", "fetch", "assets/a.js", "--method", "head"]);
        match cli.command {
            Command::Fetch { method, .. } => {
                assert_eq!(parse_method(&method).unwrap(), reqwest::Method::HEAD);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::parse_from(["folio-offline", "install", "--config", "worker.json"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("worker.json")));
    }
}
