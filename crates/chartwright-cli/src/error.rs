//! CLI error types with exit code handling
//!
//! Library errors are sorted into a few user-facing categories, each with its
//! own exit code.

use miette::Diagnostic;
use thiserror::Error;

use chartwright_core::CoreError;
use chartwright_repo::RepoError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Configuration, manifest, or repository definition problem
    #[error("Configuration error: {message}")]
    #[diagnostic(code(chartwright::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Dependency cycle or unknown chart
    #[error("Chart error: {message}")]
    #[diagnostic(code(chartwright::cli::chart))]
    Chart { message: String },

    /// Fetching, building, or packaging a chart failed
    #[error("{message}")]
    #[diagnostic(code(chartwright::cli::fetch))]
    Fetch { message: String },

    /// Repository lock still held after the configured wait
    #[error("{message}")]
    #[diagnostic(
        code(chartwright::cli::lock_timeout),
        help("another publish is in progress; retry later or raise publish.lockTimeout")
    )]
    LockTimeout { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartwright::cli::io))]
    Io { message: String },

    /// Anything else, e.g. object store failures
    #[error("{message}")]
    #[diagnostic(code(chartwright::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Fetch { .. } => exit_codes::FETCH_ERROR,
            CliError::LockTimeout { .. } => exit_codes::LOCK_TIMEOUT,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Cycle { .. } | CoreError::UnknownChart { .. } => CliError::Chart { message },
            CoreError::Io(_) => CliError::Io { message },
            e if e.is_configuration() => CliError::Config {
                message,
                help: None,
            },
            _ => CliError::Other { message },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        if let RepoError::Core(core) = err {
            return core.into();
        }

        let message = err.to_string();
        if err.is_lock_timeout() {
            return CliError::LockTimeout { message };
        }
        if err.is_configuration() {
            return CliError::Config {
                message,
                help: None,
            };
        }
        match err {
            RepoError::FetchFailed { .. }
            | RepoError::UnexpectedArchiveLayout { .. }
            | RepoError::BuildFailed { .. }
            | RepoError::ToolFailed { .. } => CliError::Fetch { message },
            RepoError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_lock_timeout_exit_code() {
        let err: CliError = RepoError::LockTimeout {
            path: "stable/index.yaml.lock".to_string(),
            waited: Duration::from_secs(300),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::LOCK_TIMEOUT);
    }

    #[test]
    fn test_core_errors_through_repo_error() {
        let err: CliError = RepoError::Core(CoreError::Cycle {
            cycle: "a → b → a".to_string(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_codes::CHART_ERROR);
        assert!(err.to_string().contains("a → b → a"));

        let err: CliError = RepoError::Core(CoreError::InvalidChart {
            message: "bad".to_string(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);
    }

    #[test]
    fn test_repo_error_categories() {
        let err: CliError = RepoError::RepositoryNotFound {
            name: "nowhere".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);

        let err: CliError = RepoError::FetchFailed {
            repo: "stable".to_string(),
            name: "redis".to_string(),
            version: "17.3.0".to_string(),
            message: "exit status: 1".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::FETCH_ERROR);

        let err: CliError = RepoError::Store {
            message: "503".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::ERROR);
    }
}
