//! Local cache of fetched charts
//!
//! Each [`ChartRelease`] is downloaded at most once per cache instance, into
//! `<root>/<repo>/<name>-<version>`. Concurrent callers asking for the same
//! release wait for the single download and all receive the same outcome,
//! failures included.

use semver::Version;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RepoError, Result};
use crate::memo::KeyedOnce;
use crate::tool::ChartTool;

/// A chart version in a named repository
///
/// Name and repository become cache path components, so both must be a single
/// plain path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartRelease {
    pub(crate) name: String,
    /// Repository name as configured, not its URL
    pub(crate) repo: String,
    pub(crate) version: Version,
}

impl ChartRelease {
    pub fn new(name: impl Into<String>, repo: impl Into<String>, version: Version) -> Result<Self> {
        let name = name.into();
        let repo = repo.into();

        for (field, value) in [("chart name", &name), ("repository name", &repo)] {
            if let Some(reason) = unsafe_segment(value) {
                return Err(RepoError::InvalidRelease {
                    repo: repo.clone(),
                    name: name.clone(),
                    reason: format!("{} {}", field, reason),
                });
            }
        }

        Ok(Self {
            name,
            repo,
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

fn unsafe_segment(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        Some("is empty")
    } else if value == "." || value == ".." {
        Some("is a relative path")
    } else if value.contains(['/', '\\', '\0']) {
        Some("contains a path separator")
    } else {
        None
    }
}

impl fmt::Display for ChartRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.repo, self.name, self.version)
    }
}

/// Memoized failure, replayed to every caller of the same release
#[derive(Debug, Clone)]
enum Failure {
    UnknownRepository,
    Layout(Vec<String>),
    Fetch(String),
}

impl Failure {
    fn to_error(&self, release: &ChartRelease) -> RepoError {
        match self {
            Failure::UnknownRepository => RepoError::RepositoryNotFound {
                name: release.repo.clone(),
            },
            Failure::Layout(found) => RepoError::UnexpectedArchiveLayout {
                name: release.name.clone(),
                version: release.version.to_string(),
                found: found.clone(),
            },
            Failure::Fetch(message) => RepoError::FetchFailed {
                repo: release.repo.clone(),
                name: release.name.clone(),
                version: release.version.to_string(),
                message: message.clone(),
            },
        }
    }
}

impl From<RepoError> for Failure {
    fn from(e: RepoError) -> Self {
        Failure::Fetch(e.to_string())
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::Fetch(e.to_string())
    }
}

/// Fetch-and-unpack cache for remote charts
pub struct ChartCache {
    root: PathBuf,
    /// Repository name -> URL the tool downloads from
    repositories: HashMap<String, String>,
    tool: Arc<dyn ChartTool>,
    entries: KeyedOnce<ChartRelease, std::result::Result<PathBuf, Failure>>,
}

impl ChartCache {
    /// Cache under `root`, resolving repository names through `config`
    pub fn new(root: impl Into<PathBuf>, config: &Config, tool: Arc<dyn ChartTool>) -> Self {
        let repositories = config
            .repositories
            .iter()
            .map(|r| (r.name.clone(), r.fetch_url()))
            .collect();
        Self {
            root: root.into(),
            repositories,
            tool,
            entries: KeyedOnce::new(),
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `release` is unpacked once fetched
    pub fn path_for(&self, release: &ChartRelease) -> PathBuf {
        self.root
            .join(&release.repo)
            .join(format!("{}-{}", release.name, release.version))
    }

    /// Fetch `release` unless this cache already did, returning its directory
    pub async fn fetch(&self, release: &ChartRelease) -> Result<PathBuf> {
        self.entries
            .get_or_init(release, || self.download(release))
            .await
            .map_err(|f| f.to_error(release))
    }

    async fn download(&self, release: &ChartRelease) -> std::result::Result<PathBuf, Failure> {
        let url = self
            .repositories
            .get(&release.repo)
            .ok_or(Failure::UnknownRepository)?;

        let repo_dir = self.root.join(&release.repo);
        tokio::fs::create_dir_all(&repo_dir).await?;

        // Sibling of the final location so the rename stays on one filesystem
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&repo_dir)?;

        tracing::debug!(release = %release, url, "fetching chart");
        self.tool
            .fetch(
                url,
                &release.name,
                &release.version.to_string(),
                staging.path(),
            )
            .await?;

        let mut unpacked = Vec::new();
        let mut entries = tokio::fs::read_dir(staging.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            unpacked.push(entry.file_name().to_string_lossy().into_owned());
        }
        unpacked.sort();

        if unpacked.len() != 1 {
            return Err(Failure::Layout(unpacked));
        }
        let top = &unpacked[0];

        let canonical = self.path_for(release);
        if tokio::fs::try_exists(&canonical).await? {
            tracing::debug!("replacing stale cache entry {}", canonical.display());
            tokio::fs::remove_dir_all(&canonical).await?;
        }
        tokio::fs::rename(staging.path().join(top), &canonical).await?;

        tracing::info!(release = %release, "cached chart at {}", canonical.display());
        Ok(canonical)
    }
}
