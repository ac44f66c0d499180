//! Chartwright Repository Side
//!
//! This crate moves charts between a source tree and a remote repository:
//!
//! - **Chart cache**: fetch-and-unpack of published charts, once per release
//! - **Resolver**: source copy or published artifact, by mode
//! - **Remote lock**: mutual exclusion over an object store path
//! - **Publisher**: locked, dependency-ordered publish of charts and index
//!
//! ## Key Features
//!
//! - **At-most-once fetches**: concurrent callers share one download and its outcome
//! - **Self-healing lock**: a lock left by a crashed publisher is swept once stale
//! - **Safe ordering**: dependents are republished after what they depend on
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chartwright_core::SourceTree;
//! use chartwright_repo::{Config, GcsStore, HelmCli, PublishTarget, Publisher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let target = PublishTarget::from_config(&config)?;
//! let store = Arc::new(GcsStore::new(target.bucket.clone())?);
//!
//! let source = SourceTree::load(&config.charts_dir)?;
//! let mut publisher = Publisher::new(source, store, Arc::new(HelmCli::new()), target);
//!
//! let report = publisher.publish(&["common"], false).await?;
//! for (chart, version) in &report.versions {
//!     println!("{} {}", chart, version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
mod memo;
pub mod publish;
pub mod remote_lock;
pub mod resolver;
pub mod store;
pub mod tool;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use cache::{ChartCache, ChartRelease};
pub use config::{Config, PublishConfig, Repository, RepositoryType};
pub use error::{RepoError, Result};
pub use index::{ChartEntry, RepositoryIndex};
pub use publish::{PublishReport, PublishTarget, Publisher};
pub use remote_lock::{LockHandle, RemoteLock};
pub use resolver::{ChartResolver, ResolveMode};
pub use store::{GcsStore, MemoryStore, ObjectAttributes, ObjectStore};
pub use tool::{ChartTool, HelmCli};
