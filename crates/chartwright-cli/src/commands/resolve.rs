//! Resolve command - locate the chart directory for a release

use semver::Version;
use std::sync::Arc;

use chartwright_repo::{ChartCache, ChartRelease, ChartResolver, ChartTool, HelmCli, ResolveMode};

use super::Global;
use crate::error::{CliError, Result};

pub async fn run(
    global: &Global,
    name: &str,
    version: &str,
    repo: Option<&str>,
    mode: ResolveMode,
) -> Result<()> {
    let config = global.load_config()?;

    let version = Version::parse(version).map_err(|e| CliError::Config {
        message: format!("invalid version '{}': {}", version, e),
        help: Some("versions are exact, e.g. 1.4.2".to_string()),
    })?;
    let repo = match repo {
        Some(repo) => repo.to_string(),
        None => config.publish.repository.clone().ok_or_else(|| {
            CliError::config_with_help(
                "no repository given",
                "pass --repo or set publish.repository",
            )
        })?,
    };
    let release = ChartRelease::new(name, repo, version)?;

    let tool: Arc<dyn ChartTool> = Arc::new(HelmCli::new());
    let cache = Arc::new(ChartCache::new(config.cache_dir()?, &config, tool.clone()));
    let source = global.load_source(&config)?;
    let resolver = ChartResolver::new(source, cache, tool, mode);

    let path = resolver.resolve(&release).await?;
    println!("{}", path.display());
    Ok(())
}
