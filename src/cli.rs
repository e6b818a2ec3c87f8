//! Command-line interface parsing for folio-offline
//!
//! This module handles parsing of CLI arguments using clap and turning them
//! into the worker configuration and cache location used at startup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Method;
use thiserror::Error;

use crate::cache::DiskStorage;
use crate::config::{ConfigError, WorkerConfig};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The --method value is not a valid HTTP method
    #[error("Invalid method: '{0}'")]
    InvalidMethod(String),

    /// A fetch path could not be resolved against the worker scope
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    /// No cache directory was given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,
}

/// folio-offline - Offline cache manager for the portfolio site
#[derive(Parser, Debug)]
#[command(name = "folio-offline")]
#[command(about = "Versioned offline cache for the portfolio site with cache-first fetching")]
#[command(version)]
pub struct Cli {
    /// JSON file with the worker configuration (app name, version, manifest, prefixes)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache buckets
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Origin the site is served from, overriding the config file
    #[arg(long, global = true, value_name = "URL")]
    pub origin: Option<String>,

    /// Give up on network requests after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install the worker: pre-cache the asset manifest and evict stale buckets
    Install,

    /// Request paths through the worker, cache first
    Fetch {
        /// Scope-relative paths, e.g. assets/index.js
        #[arg(required = true)]
        paths: Vec<String>,

        /// HTTP method to use
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// List cache buckets and their entries
    Status,

    /// Delete every bucket belonging to this app
    Clear,
}

/// Parses a method argument, case-insensitively
///
/// # Returns
/// * `Ok(Method)` for a valid HTTP method token
/// * `Err(CliError::InvalidMethod)` otherwise
pub fn parse_method(s: &str) -> Result<Method, CliError> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(s.to_string()))
}

impl Cli {
    /// Builds the worker configuration from --config and --origin
    pub fn worker_config(&self) -> Result<WorkerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)?,
            None => WorkerConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config = config.with_origin(origin.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Opens the bucket store at --cache-dir or the XDG cache directory
    pub fn storage(&self) -> Result<DiskStorage, CliError> {
        match &self.cache_dir {
            Some(dir) => Ok(DiskStorage::with_dir(dir.clone())),
            None => DiskStorage::new().ok_or(CliError::NoCacheDir),
        }
    }

    /// Network timeout, if one was requested
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_case_insensitive() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method("POST").unwrap(), Method::POST);
    }

    #[test]
    fn test_parse_method_invalid() {
        let err = parse_method("GE T").unwrap_err();
        assert!(err.to_string().contains("Invalid method"));
    }

    #[test]
    fn test_cli_parse_install() {
        let cli = Cli::parse_from(["folio-offline", "install"]);
        assert_eq!(cli.command, Command::Install);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_fetch_paths() {
        let cli = Cli::parse_from(["folio-offline", "fetch", "assets/a.js", "images/b.png"]);
        match cli.command {
            Command::Fetch { paths, method } => {
                assert_eq!(paths, vec!["assets/a.js", "images/b.png"]);
                assert_eq!(method, "GET");
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_fetch_requires_path() {
        assert!(Cli::try_parse_from(["folio-offline", "fetch"]).is_err());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "folio-offline",
            "status",
            "--cache-dir",
            "/tmp/buckets",
            "--timeout",
            "5",
            "-v",
        ]);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/buckets")));
        assert_eq!(cli.timeout(), Some(Duration::from_secs(5)));
        assert!(cli.verbose);
    }

    #[test]
    fn test_worker_config_default_with_origin_override() {
        let cli = Cli::parse_from([
            "folio-offline",
            "install",
            "--origin",
            "https://example.github.io",
        ]);
        let config = cli.worker_config().unwrap();
        assert_eq!(config.origin, "https://example.github.io");
        assert_eq!(config.cache_name(), "portfolio-cache-v1");
    }

    #[test]
    fn test_worker_config_rejects_bad_origin() {
        let cli = Cli::parse_from(["folio-offline", "install", "--origin", "example"]);
        assert!(cli.worker_config().is_err());
    }

    #[test]
    fn test_storage_uses_cache_dir() {
        let cli = Cli::parse_from(["folio-offline", "status", "--cache-dir", "/tmp/x"]);
        let storage = cli.storage().unwrap();
        assert_eq!(storage.root(), &PathBuf::from("/tmp/x"));
    }
}
