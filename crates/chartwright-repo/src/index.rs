//! Repository index types
//!
//! Helm-compatible `index.yaml`, read before publishing to find the highest
//! version of each chart already in the repository.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{RepoError, Result};

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Charts indexed by name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: Utc::now(),
            entries: HashMap::new(),
        }
    }
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Read an index file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Highest published semver of a chart, ignoring unparsable versions
    pub fn latest_version(&self, name: &str) -> Option<Version> {
        self.entries
            .get(name)?
            .iter()
            .filter_map(|e| e.parsed_version())
            .max()
    }

    /// Get a specific version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// List all chart names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Add an entry to the index
    pub fn add_entry(&mut self, entry: ChartEntry) {
        self.entries
            .entry(entry.name.clone())
            .or_default()
            .push(entry);
    }
}

/// Chart entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Chart name
    pub name: String,

    /// Chart version (semver)
    pub version: String,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// URLs to download the chart archive
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    /// Creation timestamp
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    /// Parse version as semver
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}
