//! Choosing between a chart's source directory and its published artifact

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chartwright_core::SourceTree;

use crate::cache::{ChartCache, ChartRelease};
use crate::error::{RepoError, Result};
use crate::memo::KeyedOnce;
use crate::tool::ChartTool;

/// Which copy of a chart wins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Source copy first, published artifact for charts not in source
    #[default]
    Development,
    /// Published artifact first, source copy only if it is the exact version
    Deploy,
}

impl FromStr for ResolveMode {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" | "dev" => Ok(ResolveMode::Development),
            "deploy" => Ok(ResolveMode::Deploy),
            other => Err(RepoError::InvalidConfig {
                message: format!(
                    "unknown resolve mode '{}', expected development or deploy",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveMode::Development => write!(f, "development"),
            ResolveMode::Deploy => write!(f, "deploy"),
        }
    }
}

/// Resolves releases to chart directories
///
/// In development mode, source charts have their dependencies built once per
/// resolver, however many releases point at them.
pub struct ChartResolver {
    source: SourceTree,
    cache: Arc<ChartCache>,
    tool: Arc<dyn ChartTool>,
    mode: ResolveMode,
    builds: KeyedOnce<String, std::result::Result<(), String>>,
}

impl ChartResolver {
    pub fn new(
        source: SourceTree,
        cache: Arc<ChartCache>,
        tool: Arc<dyn ChartTool>,
        mode: ResolveMode,
    ) -> Self {
        Self {
            source,
            cache,
            tool,
            mode,
            builds: KeyedOnce::new(),
        }
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Directory holding the chart to use for `release`
    pub async fn resolve(&self, release: &ChartRelease) -> Result<PathBuf> {
        match self.mode {
            ResolveMode::Development => {
                if self.source.contains(&release.name) {
                    self.built_source(&release.name).await
                } else {
                    self.cache.fetch(release).await
                }
            }
            ResolveMode::Deploy => match self.cache.fetch(release).await {
                Ok(path) => Ok(path),
                Err(fetch_error) => {
                    let fallback = match self.source.version_of(&release.name) {
                        Some(version) if version == &release.version => {
                            self.source.path_of(&release.name)
                        }
                        _ => None,
                    };
                    let Some(path) = fallback else {
                        return Err(fetch_error);
                    };
                    // Source copy as-is; deploys never trigger a dependency build
                    tracing::warn!(
                        release = %release,
                        error = %fetch_error,
                        "falling back to source copy"
                    );
                    Ok(path.to_path_buf())
                }
            },
        }
    }

    /// Source directory of `name` after its dependency build
    async fn built_source(&self, name: &str) -> Result<PathBuf> {
        let path = self
            .source
            .path_of(name)
            .ok_or_else(|| RepoError::Other(format!("{} is not a source chart", name)))?
            .to_path_buf();

        self.builds
            .get_or_init(&name.to_string(), || async {
                tracing::debug!("building dependencies of {}", name);
                self.tool
                    .dependency_build(&path)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|message| RepoError::BuildFailed {
                name: name.to_string(),
                message,
            })?;

        Ok(path)
    }
}
