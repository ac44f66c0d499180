//! Remote object stores
//!
//! The chart repository lives in an object store. Besides plain uploads and
//! downloads, the store must offer generation-gated writes and deletes; the
//! repository lock is built from nothing else.
//!
//! - **Gcs**: Google Cloud Storage through its XML API
//! - **Memory**: in-process store for tests and local experiments

mod gcs;
mod memory;

pub use gcs::GcsStore;
pub use memory::{MemoryStore, OperationCounts};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::{RepoError, Result};

/// Store-assigned version of an object; changes on every write
pub type Generation = i64;

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Current generation
    pub generation: Generation,
    /// When this generation was written
    pub created: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// Object store client
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object's metadata, [`RepoError::ObjectNotFound`] if absent
    async fn attributes(&self, path: &str) -> Result<ObjectAttributes>;

    /// Upload a local file, overwriting any existing object
    async fn upload(&self, local: &Path, path: &str, cache_control: &str) -> Result<Generation>;

    /// Download an object into a local file
    async fn download(&self, path: &str, local: &Path) -> Result<()>;

    /// Create an object only if nothing exists at `path`
    ///
    /// Fails with [`RepoError::PreconditionFailed`] when the object exists.
    async fn create_if_absent(&self, path: &str, contents: &[u8]) -> Result<Generation>;

    /// Delete an object only if its generation is still `generation`
    ///
    /// Fails with [`RepoError::PreconditionFailed`] on a generation mismatch and
    /// [`RepoError::ObjectNotFound`] when the object is gone.
    async fn delete_if_generation(&self, path: &str, generation: Generation) -> Result<()>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.attributes(path).await {
            Ok(_) => Ok(true),
            Err(RepoError::ObjectNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Join an object prefix and a name with exactly one `/`
pub fn object_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
