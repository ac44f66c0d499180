//! Error types for repository operations

use std::time::Duration;
use thiserror::Error;

use chartwright_core::CoreError;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Repository already exists: {name}")]
    RepositoryAlreadyExists { name: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid chart release {repo}/{name}: {reason}")]
    InvalidRelease {
        repo: String,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    // ============ Index Errors ============
    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    // ============ Fetch Errors ============
    #[error("Failed to fetch {name}@{version} from repository {repo}: {message}")]
    FetchFailed {
        repo: String,
        name: String,
        version: String,
        message: String,
    },

    #[error("Unexpected archive layout for {name}@{version}: expected one top-level entry, found {found:?}")]
    UnexpectedArchiveLayout {
        name: String,
        version: String,
        found: Vec<String>,
    },

    #[error("Failed to build dependencies of {name}: {message}")]
    BuildFailed { name: String, message: String },

    #[error("Command failed: {command} ({status})")]
    ToolFailed { command: String, status: String },

    // ============ Object Store Errors ============
    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Precondition failed for {path}")]
    PreconditionFailed { path: String },

    #[error("Object store error: {message}")]
    Store { message: String },

    // ============ Lock Errors ============
    #[error("Timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: String, waited: Duration },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl RepoError {
    /// A lock timeout is an expected outcome; the whole publish can be retried
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, RepoError::LockTimeout { .. })
    }

    /// The object store refused a conditional write or delete
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, RepoError::PreconditionFailed { .. })
    }

    /// Malformed manifests, undefined repositories, duplicate names
    pub fn is_configuration(&self) -> bool {
        match self {
            RepoError::RepositoryNotFound { .. }
            | RepoError::RepositoryAlreadyExists { .. }
            | RepoError::InvalidRepositoryUrl { .. }
            | RepoError::InvalidConfig { .. }
            | RepoError::InvalidRelease { .. } => true,
            RepoError::Core(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Store {
                message: format!("Request timed out: {}", e),
            }
        } else if e.is_connect() {
            RepoError::Store {
                message: format!("Connection failed: {}", e),
            }
        } else {
            RepoError::Store {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
