//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid Chart.yaml: {message}")]
    InvalidChart { message: String },

    #[error("Chart '{name}' is defined twice: {first} and {second}")]
    DuplicateChart {
        name: String,
        first: String,
        second: String,
    },

    #[error("Unknown chart: {name}")]
    UnknownChart { name: String },

    #[error("Circular dependency detected: {cycle}")]
    Cycle { cycle: String },

    #[error("Failed to parse Chart.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

impl CoreError {
    /// True for errors caused by malformed manifests or chart layout
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidChart { .. }
                | Self::DuplicateChart { .. }
                | Self::YamlParse(_)
                | Self::InvalidVersion(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
