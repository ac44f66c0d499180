//! Chartwright configuration
//!
//! Stored in `~/.config/chartwright/config.yaml` unless a path is given:
//!
//! ```yaml
//! apiVersion: chartwright/v1
//! chartsDir: charts
//! repositories:
//!   - name: internal
//!     url: gs://acme-charts/stable
//! publish:
//!   repository: internal
//!   lockTimeout: 5m
//!   staleLockAge: 1h
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Public HTTPS endpoint serving Google Cloud Storage objects
pub const GCS_PUBLIC_ENDPOINT: &str = "https://storage.googleapis.com";

/// Configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Directory holding chart sources, one chart per subdirectory
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,

    /// Where fetched charts are unpacked (defaults to a per-user cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<Repository>,

    /// Publishing settings
    #[serde(default)]
    pub publish: PublishConfig,
}

fn default_api_version() -> String {
    "chartwright/v1".to_string()
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            charts_dir: default_charts_dir(),
            cache_dir: None,
            repositories: Vec::new(),
            publish: PublishConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("chartwright").join("config.yaml"))
    }

    /// Directory fetched charts are unpacked into
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("chartwright").join("charts"))
    }

    /// Reject duplicate names and URLs we can't serve
    pub fn validate(&self) -> Result<()> {
        for (i, repo) in self.repositories.iter().enumerate() {
            if self.repositories[..i].iter().any(|r| r.name == repo.name) {
                return Err(RepoError::RepositoryAlreadyExists {
                    name: repo.name.clone(),
                });
            }
            RepositoryType::detect(&repo.url)?;
        }

        if let Some(target) = &self.publish.repository
            && self.get(target).is_none()
        {
            return Err(RepoError::RepositoryNotFound {
                name: target.clone(),
            });
        }

        Ok(())
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Get a repository by name, failing if it is not configured
    pub fn repository(&self, name: &str) -> Result<&Repository> {
        self.get(name).ok_or_else(|| RepoError::RepositoryNotFound {
            name: name.to_string(),
        })
    }

    /// Repository that publishing writes to
    pub fn publish_repository(&self) -> Result<&Repository> {
        let name = self
            .publish
            .repository
            .as_deref()
            .ok_or_else(|| RepoError::InvalidConfig {
                message: "publish.repository is not set".to_string(),
            })?;
        self.repository(name)
    }

    /// List all repository names
    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Publishing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Name of the repository charts are published to
    #[serde(default)]
    pub repository: Option<String>,

    /// How long to wait for the repository lock
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,

    /// Age after which a lock is considered abandoned
    #[serde(default = "default_stale_lock_age", with = "humantime_serde")]
    pub stale_lock_age: Duration,

    /// Cache-Control header for chart archives
    #[serde(default = "default_chart_cache_control")]
    pub chart_cache_control: String,

    /// Cache-Control header for index.yaml
    #[serde(default = "default_index_cache_control")]
    pub index_cache_control: String,
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_stale_lock_age() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_chart_cache_control() -> String {
    "public, max-age=300".to_string()
}

fn default_index_cache_control() -> String {
    "no-cache".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            repository: None,
            lock_timeout: default_lock_timeout(),
            stale_lock_age: default_stale_lock_age(),
            chart_cache_control: default_chart_cache_control(),
            index_cache_control: default_index_cache_control(),
        }
    }
}

/// Repository definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name for this repository
    pub name: String,

    /// Repository URL (`gs://bucket/prefix`, HTTP(S) or `file://`)
    pub url: String,
}

impl Repository {
    /// Create a new repository from URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        RepositoryType::detect(&url)?;
        Ok(Self { name, url })
    }

    /// Detected repository type
    pub fn repo_type(&self) -> RepositoryType {
        RepositoryType::detect(&self.url).unwrap_or(RepositoryType::Http)
    }

    /// URL the chart tool downloads from
    ///
    /// `gs://` repositories are read through the public storage endpoint.
    pub fn fetch_url(&self) -> String {
        match self.gcs_location() {
            Some((bucket, prefix)) if prefix.is_empty() => {
                format!("{}/{}", GCS_PUBLIC_ENDPOINT, bucket)
            }
            Some((bucket, prefix)) => format!("{}/{}/{}", GCS_PUBLIC_ENDPOINT, bucket, prefix),
            None => self.url.trim_end_matches('/').to_string(),
        }
    }

    /// Bucket and object prefix of a `gs://` repository
    pub fn gcs_location(&self) -> Option<(String, String)> {
        let rest = self.url.strip_prefix("gs://")?;
        let rest = rest.trim_end_matches('/');
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return None;
        }
        Some((bucket.to_string(), prefix.to_string()))
    }
}

/// Repository type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// HTTP repository with index.yaml
    #[default]
    Http,

    /// Google Cloud Storage bucket
    Gcs,

    /// Local filesystem
    File,
}

impl RepositoryType {
    /// Auto-detect repository type from URL
    pub fn detect(url: &str) -> Result<Self> {
        if url.starts_with("gs://") {
            Ok(RepositoryType::Gcs)
        } else if url.starts_with("file://") || url.starts_with('/') {
            Ok(RepositoryType::File)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok(RepositoryType::Http)
        } else {
            Err(RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "URL must start with gs://, http://, https://, file://, or /".to_string(),
            })
        }
    }
}
