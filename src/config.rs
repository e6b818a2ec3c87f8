//! Worker configuration
//!
//! The cache name, asset manifest and cacheable-path policy are built once
//! into a `WorkerConfig` and handed to the worker at startup. Bumping
//! `version` is the only supported way to invalidate previously cached
//! content: the next activate evicts every bucket with a different name.

use std::fs;
use std::path::Path;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix between the app name and the version number in bucket names
const CACHE_NAME_INFIX: &str = "-cache-v";

/// Errors that can occur when loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The config file is not valid JSON for `WorkerConfig`
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The origin is not an absolute http(s) URL without a path
    #[error("Invalid origin: '{0}'")]
    InvalidOrigin(String),

    /// The scope does not start and end with '/'
    #[error("Invalid scope: '{0}' (must start and end with '/')")]
    InvalidScope(String),

    /// The app name is empty or contains the bucket infix
    #[error("Invalid app name: '{0}'")]
    InvalidAppName(String),
}

/// Configuration for a single cache worker instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application name, used as the bucket name prefix
    pub app_name: String,
    /// Cache version; part of the bucket name
    pub version: u32,
    /// Origin the site is served from (e.g. `https://user.github.io`)
    pub origin: String,
    /// Path the worker is installed under; manifest and prefixes resolve against it
    pub scope: String,
    /// Scope-relative URLs pre-cached on install
    pub manifest: Vec<String>,
    /// Scope-relative directory prefixes eligible for runtime caching
    pub cacheable_prefixes: Vec<String>,
    /// Whether install asks to skip the waiting state once it settles
    pub skip_waiting_on_install: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "portfolio".to_string(),
            version: 1,
            origin: "http://localhost:5173".to_string(),
            scope: "/".to_string(),
            manifest: vec![
                String::new(),
                "index.html".to_string(),
                "manifest.json".to_string(),
                "favicon.ico".to_string(),
                "icons/icon-192x192.png".to_string(),
                "icons/icon-512x512.png".to_string(),
            ],
            cacheable_prefixes: vec![
                "assets/".to_string(),
                "images/".to_string(),
                "icons/".to_string(),
            ],
            skip_waiting_on_install: true,
        }
    }
}

impl WorkerConfig {
    /// Loads a configuration from a JSON file
    ///
    /// Fields missing from the file keep their default values. The result is
    /// validated before it is returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: WorkerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the origin, e.g. from a command-line override
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Checks origin, scope and app name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.is_empty() || self.app_name.contains(CACHE_NAME_INFIX) {
            return Err(ConfigError::InvalidAppName(self.app_name.clone()));
        }
        if !self.scope.starts_with('/') || !self.scope.ends_with('/') {
            return Err(ConfigError::InvalidScope(self.scope.clone()));
        }
        self.origin_url().map(|_| ())
    }

    /// Name of the bucket owned by this version, `<app>-cache-v<N>`
    pub fn cache_name(&self) -> String {
        format!("{}{}{}", self.app_name, CACHE_NAME_INFIX, self.version)
    }

    /// Recovers the version number from a bucket name belonging to this app
    ///
    /// Returns `None` for buckets of other apps or malformed names.
    pub fn parse_bucket_version(&self, bucket: &str) -> Option<u32> {
        bucket
            .strip_prefix(self.app_name.as_str())?
            .strip_prefix(CACHE_NAME_INFIX)?
            .parse()
            .ok()
    }

    /// Whether a bucket name was produced by this app (any version)
    pub fn owns_bucket(&self, bucket: &str) -> bool {
        self.parse_bucket_version(bucket).is_some()
    }

    /// Parses the origin into a URL
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|_| ConfigError::InvalidOrigin(self.origin.clone()))?;
        let http = matches!(url.scheme(), "http" | "https");
        if !http || url.host_str().is_none() || url.path() != "/" || url.query().is_some() {
            return Err(ConfigError::InvalidOrigin(self.origin.clone()));
        }
        Ok(url)
    }

    /// Absolute URL of the worker scope
    pub fn scope_url(&self) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(&self.scope)
            .map_err(|_| ConfigError::InvalidScope(self.scope.clone()))
    }

    /// Resolves the asset manifest against the scope, preserving order
    ///
    /// Entries that fail to resolve are dropped; duplicates are kept once.
    pub fn asset_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let scope = self.scope_url()?;
        let mut urls: Vec<Url> = Vec::with_capacity(self.manifest.len());
        for entry in &self.manifest {
            if let Ok(url) = scope.join(entry) {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }

    /// Cacheable prefixes as absolute paths under the scope
    pub fn resolved_prefixes(&self) -> Vec<String> {
        self.cacheable_prefixes
            .iter()
            .map(|prefix| format!("{}{}", self.scope, prefix.trim_start_matches('/')))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_cache_name() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name(), "portfolio-cache-v1");
    }

    #[test]
    fn test_version_bump_changes_cache_name() {
        let config = WorkerConfig {
            version: 2,
            ..Default::default()
        };
        assert_eq!(config.cache_name(), "portfolio-cache-v2");
    }

    #[test]
    fn test_parse_bucket_version() {
        let config = WorkerConfig::default();
        assert_eq!(config.parse_bucket_version("portfolio-cache-v7"), Some(7));
        assert_eq!(config.parse_bucket_version("portfolio-cache-vx"), None);
        assert_eq!(config.parse_bucket_version("other-cache-v1"), None);
        assert!(config.owns_bucket("portfolio-cache-v1"));
        assert!(!config.owns_bucket("workbox-precache"));
    }

    #[test]
    fn test_asset_urls_resolve_against_scope() {
        let config = WorkerConfig {
            origin: "https://example.github.io".to_string(),
            scope: "/portfolio/".to_string(),
            manifest: vec![
                String::new(),
                "index.html".to_string(),
                "manifest.json".to_string(),
            ],
            ..Default::default()
        };

        let urls: Vec<String> = config
            .asset_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://example.github.io/portfolio/",
                "https://example.github.io/portfolio/index.html",
                "https://example.github.io/portfolio/manifest.json",
            ]
        );
    }

    #[test]
    fn test_asset_urls_skip_duplicates() {
        let config = WorkerConfig {
            manifest: vec!["index.html".to_string(), "./index.html".to_string()],
            ..Default::default()
        };
        assert_eq!(config.asset_urls().unwrap().len(), 1);
    }

    #[test]
    fn test_resolved_prefixes_include_scope() {
        let config = WorkerConfig {
            scope: "/portfolio/".to_string(),
            cacheable_prefixes: vec!["assets/".to_string(), "/images/".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.resolved_prefixes(),
            vec!["/portfolio/assets/", "/portfolio/images/"]
        );
    }

    #[test]
    fn test_validate_rejects_bad_scope() {
        let config = WorkerConfig {
            scope: "portfolio".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScope(_))));
    }

    #[test]
    fn test_validate_rejects_origin_with_path() {
        let config = WorkerConfig::default().with_origin("https://example.com/app");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOrigin(_))));

        let config = WorkerConfig::default().with_origin("ftp://example.com");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOrigin(_))));
    }

    #[test]
    fn test_load_fills_missing_fields_with_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("worker.json");
        fs::write(&path, r#"{ "app_name": "folio", "version": 3 }"#).unwrap();

        let config = WorkerConfig::load(&path).expect("Config should load");

        assert_eq!(config.cache_name(), "folio-cache-v3");
        assert_eq!(config.scope, "/");
        assert_eq!(config.cacheable_prefixes.len(), 3);
        assert!(config.skip_waiting_on_install);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("worker.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(WorkerConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = WorkerConfig::load(Path::new("/nonexistent/worker.json"));
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
