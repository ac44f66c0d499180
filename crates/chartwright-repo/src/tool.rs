//! External chart tooling
//!
//! Fetching, building, packaging and indexing charts is delegated to `helm`
//! (and `helm-docs` for README generation). Only exit status is interpreted;
//! everything else is observed on the filesystem.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RepoError, Result};

/// Chart tool verbs used by the cache, resolver and publisher
#[async_trait]
pub trait ChartTool: Send + Sync {
    /// Download `name@version` from the repository at `repo_url` and unpack it
    /// into `dest_dir`
    async fn fetch(&self, repo_url: &str, name: &str, version: &str, dest_dir: &Path) -> Result<()>;

    /// Vendor a chart's dependencies into its `charts/` directory
    async fn dependency_build(&self, chart_dir: &Path) -> Result<()>;

    /// Package a chart directory into `<dest_dir>/<name>-<version>.tgz`
    async fn package(&self, chart_dir: &Path, dest_dir: &Path) -> Result<()>;

    /// Write `<charts_dir>/index.yaml` for every archive in `charts_dir`,
    /// merged into `previous_index` when given
    async fn index_merge(&self, charts_dir: &Path, url: &str, previous_index: Option<&Path>) -> Result<()>;

    /// Regenerate a chart's README
    async fn generate_docs(&self, chart_dir: &Path) -> Result<()>;
}

/// [`ChartTool`] backed by the `helm` and `helm-docs` binaries
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm: OsString,
    helm_docs: Option<OsString>,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmCli {
    /// Use `helm` and `helm-docs` from `PATH`
    pub fn new() -> Self {
        Self {
            helm: "helm".into(),
            helm_docs: Some("helm-docs".into()),
        }
    }

    /// Use specific binaries; without `helm_docs`, doc generation is skipped
    pub fn with_binaries(helm: impl Into<OsString>, helm_docs: Option<OsString>) -> Self {
        Self {
            helm: helm.into(),
            helm_docs,
        }
    }

    async fn exec(&self, program: &OsString, args: Vec<OsString>) -> Result<()> {
        let command = std::iter::once(program)
            .chain(args.iter())
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Executing: {}", command);

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RepoError::ToolFailed {
                command: command.clone(),
                status: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{} stderr: {}", command, stderr);
            let status = match stderr.trim().lines().last() {
                Some(line) => format!("{}: {}", output.status, line),
                None => output.status.to_string(),
            };
            Err(RepoError::ToolFailed { command, status })
        }
    }
}

#[async_trait]
impl ChartTool for HelmCli {
    async fn fetch(&self, repo_url: &str, name: &str, version: &str, dest_dir: &Path) -> Result<()> {
        let args: Vec<OsString> = vec![
            "pull".into(),
            name.into(),
            "--repo".into(),
            repo_url.into(),
            "--version".into(),
            version.into(),
            "--untar".into(),
            "--untardir".into(),
            dest_dir.into(),
        ];
        self.exec(&self.helm, args).await
    }

    async fn dependency_build(&self, chart_dir: &Path) -> Result<()> {
        let args: Vec<OsString> = vec!["dependency".into(), "build".into(), chart_dir.into()];
        self.exec(&self.helm, args).await
    }

    async fn package(&self, chart_dir: &Path, dest_dir: &Path) -> Result<()> {
        let args: Vec<OsString> = vec![
            "package".into(),
            chart_dir.into(),
            "--destination".into(),
            dest_dir.into(),
        ];
        self.exec(&self.helm, args).await
    }

    async fn index_merge(&self, charts_dir: &Path, url: &str, previous_index: Option<&Path>) -> Result<()> {
        self.exec(&self.helm, index_args(charts_dir, url, previous_index))
            .await
    }

    async fn generate_docs(&self, chart_dir: &Path) -> Result<()> {
        match &self.helm_docs {
            Some(helm_docs) => {
                let args: Vec<OsString> = vec!["--chart-search-root".into(), chart_dir.into()];
                self.exec(helm_docs, args).await
            }
            None => {
                debug!("helm-docs not configured, skipping {}", chart_dir.display());
                Ok(())
            }
        }
    }
}

fn index_args(charts_dir: &Path, url: &str, previous_index: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "repo".into(),
        "index".into(),
        charts_dir.into(),
        "--url".into(),
        url.into(),
    ];
    if let Some(previous) = previous_index {
        args.push("--merge".into());
        args.push(previous.into());
    }
    args
}
