//! CLI commands

use std::path::PathBuf;

use chartwright_core::SourceTree;
use chartwright_repo::Config;

use crate::error::{CliError, Result};

pub mod order;
pub mod publish;
pub mod resolve;

/// Options shared by every command
pub struct Global {
    pub config: Option<PathBuf>,
    pub charts_dir: Option<PathBuf>,
}

impl Global {
    /// Load the config file, falling back to defaults when none exists
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) if !path.exists() => {
                return Err(CliError::config_with_help(
                    format!("config file {} does not exist", path.display()),
                    "create it or drop --config to use ~/.config/chartwright/config.yaml",
                ));
            }
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        Ok(config)
    }

    /// Load the chart source tree
    pub fn load_source(&self, config: &Config) -> Result<SourceTree> {
        let dir = self.charts_dir.as_ref().unwrap_or(&config.charts_dir);
        let source = SourceTree::load(dir)?;
        tracing::debug!("{} chart(s) in {}", source.len(), dir.display());
        Ok(source)
    }
}
