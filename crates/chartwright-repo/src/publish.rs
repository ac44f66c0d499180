//! Publishing charts to a remote repository
//!
//! A publish run holds the repository lock from the moment it reads the
//! current index until the merged index is uploaded:
//!
//! 1. sweep a stale lock, then acquire the lock
//! 2. download `index.yaml` (an absent index is an empty repository)
//! 3. for each chart, dependencies first: generate docs, bump the version,
//!    build dependencies, package
//! 4. merge the new packages into the index
//! 5. upload every package, then the index
//! 6. release the lock, whatever happened above
//!
//! A dry run stops after step 4.

use chrono::Utc;
use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chartwright_core::{CoreError, DependencyGraph, SourceTree, next_version};

use crate::config::{Config, PublishConfig};
use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;
use crate::remote_lock::RemoteLock;
use crate::store::{ObjectStore, object_path};
use crate::tool::ChartTool;

const INDEX_FILE: &str = "index.yaml";
const LOCK_FILE: &str = "index.yaml.lock";

/// Where a repository lives in its object store
#[derive(Debug, Clone)]
pub struct PublishTarget {
    /// Bucket holding the repository
    pub bucket: String,
    /// Object prefix of the repository inside the bucket
    pub prefix: String,
    /// URL clients download charts from, written into the index
    pub url: String,
    pub settings: PublishConfig,
}

impl PublishTarget {
    /// Target for the configured publish repository, which must be `gs://`
    pub fn from_config(config: &Config) -> Result<Self> {
        let repo = config.publish_repository()?;
        let (bucket, prefix) = repo
            .gcs_location()
            .ok_or_else(|| RepoError::InvalidConfig {
                message: format!(
                    "publish repository {} must be a gs:// URL, got {}",
                    repo.name, repo.url
                ),
            })?;
        Ok(Self {
            bucket,
            prefix,
            url: repo.fetch_url(),
            settings: config.publish.clone(),
        })
    }

    fn index_path(&self) -> String {
        object_path(&self.prefix, INDEX_FILE)
    }

    fn lock_path(&self) -> String {
        object_path(&self.prefix, LOCK_FILE)
    }
}

/// Outcome of a publish run
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    /// Version each chart was published at, by chart name
    pub versions: BTreeMap<String, Version>,
    /// Objects written, or that would have been written on a dry run
    pub objects: Vec<String>,
    pub dry_run: bool,
}

/// Publishes source charts and their dependents
pub struct Publisher {
    source: SourceTree,
    store: Arc<dyn ObjectStore>,
    tool: Arc<dyn ChartTool>,
    lock: RemoteLock,
    target: PublishTarget,
}

impl Publisher {
    pub fn new(
        source: SourceTree,
        store: Arc<dyn ObjectStore>,
        tool: Arc<dyn ChartTool>,
        target: PublishTarget,
    ) -> Self {
        let lock = RemoteLock::new(store.clone());
        Self {
            source,
            store,
            tool,
            lock,
            target,
        }
    }

    /// Source tree, with any versions bumped by a previous run
    pub fn source(&self) -> &SourceTree {
        &self.source
    }

    /// Publish `charts` and every chart depending on them
    pub async fn publish<S: AsRef<str>>(&mut self, charts: &[S], dry_run: bool) -> Result<PublishReport> {
        let graph = DependencyGraph::from_source(&self.source)?;
        let order = graph.publish_order(charts)?;
        tracing::info!("publish order: {}", order.join(", "));

        let lock_path = self.target.lock_path();
        if let Err(e) = self
            .lock
            .delete_stale_lock_if_exists(&lock_path, self.target.settings.stale_lock_age)
            .await
        {
            tracing::warn!(error = %e, "could not check for a stale lock");
        }

        let description = format!(
            "locked by {} at {} to publish {}",
            std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            Utc::now().to_rfc3339(),
            order.join(", ")
        );
        let handle = self
            .lock
            .wait_for_lock(&lock_path, &description, self.target.settings.lock_timeout)
            .await?;

        let result = self.publish_locked(&order, dry_run).await;

        if let Err(e) = self.lock.release_lock(handle).await {
            tracing::warn!(error = %e, "failed to release lock {}", lock_path);
        }
        result
    }

    async fn publish_locked(&mut self, order: &[String], dry_run: bool) -> Result<PublishReport> {
        let staging = tempfile::Builder::new()
            .prefix("chartwright-publish-")
            .tempdir()?;
        let charts_dir = staging.path().join("charts");
        tokio::fs::create_dir_all(&charts_dir).await?;

        let index_path = self.target.index_path();
        let previous = if self.store.exists(&index_path).await? {
            let local = staging.path().join("previous-index.yaml");
            self.store.download(&index_path, &local).await?;
            Some(local)
        } else {
            tracing::info!("no index at {}, starting an empty repository", index_path);
            None
        };
        let index = match &previous {
            Some(path) => RepositoryIndex::load(path)?,
            None => RepositoryIndex::default(),
        };

        let mut report = PublishReport {
            dry_run,
            ..PublishReport::default()
        };
        let mut archives = Vec::new();

        for name in order {
            let version = self.package_chart(name, &index, &charts_dir).await?;
            let file = format!("{}-{}.tgz", name, version);
            archives.push(charts_dir.join(&file));
            report.objects.push(object_path(&self.target.prefix, &file));
            report.versions.insert(name.clone(), version);
        }

        self.tool
            .index_merge(&charts_dir, &self.target.url, previous.as_deref())
            .await?;
        let merged_path = charts_dir.join(INDEX_FILE);
        verify_index(&merged_path, &report.versions)?;

        if dry_run {
            tracing::info!("dry run, not uploading {} chart(s)", archives.len());
            report.objects.push(index_path);
            return Ok(report);
        }

        let settings = &self.target.settings;
        for (archive, object) in archives.iter().zip(&report.objects) {
            self.store
                .upload(archive, object, &settings.chart_cache_control)
                .await?;
            tracing::info!("uploaded {}", object);
        }
        self.store
            .upload(&merged_path, &index_path, &settings.index_cache_control)
            .await?;
        tracing::info!("uploaded {}", index_path);
        report.objects.push(index_path);

        Ok(report)
    }

    /// Docs, version bump, dependency build and package for one chart
    async fn package_chart(&mut self, name: &str, index: &RepositoryIndex, dest: &Path) -> Result<Version> {
        let chart = self
            .source
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownChart {
                name: name.to_string(),
            })?;
        let dir = chart.root.clone();

        self.tool.generate_docs(&dir).await?;

        let version = next_version(chart.version(), index.latest_version(name).as_ref());
        if &version != chart.version() {
            tracing::info!("bumping {} {} -> {}", name, chart.version(), version);
            chart.set_version(&version)?;
        }
        let has_dependencies = !chart.chart.dependencies.is_empty();

        if has_dependencies {
            self.tool.dependency_build(&dir).await?;
        }
        self.tool.package(&dir, dest).await?;

        let archive: PathBuf = dest.join(format!("{}-{}.tgz", name, version));
        if !tokio::fs::try_exists(&archive).await? {
            return Err(RepoError::Other(format!(
                "packaging {} did not produce {}",
                name,
                archive.display()
            )));
        }
        Ok(version)
    }
}

/// The merged index must list every version just packaged
fn verify_index(path: &Path, versions: &BTreeMap<String, Version>) -> Result<()> {
    let merged = RepositoryIndex::load(path)?;
    for (name, version) in versions {
        if merged.get_version(name, &version.to_string()).is_none() {
            return Err(RepoError::IndexParseError {
                message: format!("merged index is missing {} {}", name, version),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{FakeTool, write_chart};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        store: MemoryStore,
        tool: FakeTool,
    }

    impl Fixture {
        /// a <- b <- c, and an unrelated d; a@1.0.0 is already published
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let charts = tmp.path().join("charts");
            write_chart(&charts, "a", "1.0.0", &[]);
            write_chart(&charts, "b", "0.1.0", &["a"]);
            write_chart(&charts, "c", "2.0.0", &["b"]);
            write_chart(&charts, "d", "1.0.0", &[]);

            let store = MemoryStore::new();
            store.put(
                "stable/index.yaml",
                r#"apiVersion: v1
entries:
  a:
    - name: a
      version: 1.0.0
      urls: ["https://storage.googleapis.com/acme-charts/stable/a-1.0.0.tgz"]
"#,
            );

            Self {
                tmp,
                store,
                tool: FakeTool::new(),
            }
        }

        fn charts(&self) -> PathBuf {
            self.tmp.path().join("charts")
        }

        fn publisher(&self) -> Publisher {
            let mut config = Config {
                repositories: vec![
                    crate::config::Repository::new("internal", "gs://acme-charts/stable").unwrap(),
                ],
                ..Config::default()
            };
            config.publish.repository = Some("internal".to_string());
            config.publish.lock_timeout = Duration::from_secs(1);

            Publisher::new(
                SourceTree::load(self.charts()).unwrap(),
                Arc::new(self.store.clone()),
                Arc::new(self.tool.clone()),
                PublishTarget::from_config(&config).unwrap(),
            )
        }
    }

    #[test]
    fn test_target_from_config() {
        let mut config = Config {
            repositories: vec![
                crate::config::Repository::new("internal", "gs://acme-charts/stable").unwrap(),
                crate::config::Repository::new("public", "https://charts.example.com").unwrap(),
            ],
            ..Config::default()
        };
        config.publish.repository = Some("internal".to_string());

        let target = PublishTarget::from_config(&config).unwrap();
        assert_eq!(target.bucket, "acme-charts");
        assert_eq!(target.index_path(), "stable/index.yaml");
        assert_eq!(target.lock_path(), "stable/index.yaml.lock");
        assert_eq!(target.url, "https://storage.googleapis.com/acme-charts/stable");

        config.publish.repository = Some("public".to_string());
        let err = PublishTarget::from_config(&config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_publish_orders_dependencies_first() {
        let f = Fixture::new();
        let mut publisher = f.publisher();

        let report = publisher.publish(&["b", "a"], false).await.unwrap();

        assert_eq!(
            f.tool.calls_starting_with("package"),
            vec!["package a@1.1.0", "package b@0.1.0", "package c@2.0.0"]
        );
        assert_eq!(report.versions.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(report.versions["a"], Version::new(1, 1, 0));
        assert!(!report.dry_run);
        assert!(f.tool.calls().iter().all(|c| !c.ends_with(" d")));
    }

    #[tokio::test]
    async fn test_publish_uploads_charts_then_index() {
        let f = Fixture::new();
        let mut publisher = f.publisher();

        let report = publisher.publish(&["a"], false).await.unwrap();
        assert_eq!(
            report.objects,
            vec![
                "stable/a-1.1.0.tgz",
                "stable/b-0.1.0.tgz",
                "stable/c-2.0.0.tgz",
                "stable/index.yaml"
            ]
        );
        assert_eq!(
            f.store.cache_control("stable/a-1.1.0.tgz").as_deref(),
            Some("public, max-age=300")
        );
        assert_eq!(
            f.store.cache_control("stable/index.yaml").as_deref(),
            Some("no-cache")
        );

        let index = RepositoryIndex::from_bytes(&f.store.get("stable/index.yaml").unwrap()).unwrap();
        assert_eq!(index.get("a").unwrap().len(), 2);
        assert_eq!(index.latest_version("a"), Some(Version::new(1, 1, 0)));
        assert_eq!(index.latest_version("c"), Some(Version::new(2, 0, 0)));

        // Lock released
        assert!(f.store.get("stable/index.yaml.lock").is_none());
        assert_eq!(f.store.operation_counts().uploads, 4);
    }

    #[tokio::test]
    async fn test_publish_bumps_source_manifests() {
        let f = Fixture::new();
        let mut publisher = f.publisher();
        publisher.publish(&["a"], false).await.unwrap();

        let manifest = std::fs::read_to_string(f.charts().join("a").join("Chart.yaml")).unwrap();
        assert!(manifest.contains("version: 1.1.0"));
        assert!(manifest.contains("# bumped on publish"));
        assert_eq!(
            publisher.source().version_of("a"),
            Some(&Version::new(1, 1, 0))
        );
        assert!(f.charts().join("a").join("README.md").exists());
    }

    #[tokio::test]
    async fn test_only_charts_with_dependencies_are_built() {
        let f = Fixture::new();
        let mut publisher = f.publisher();
        publisher.publish(&["a"], false).await.unwrap();

        assert_eq!(
            f.tool.calls_starting_with("build"),
            vec!["build b", "build c"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_uploads_nothing() {
        let f = Fixture::new();
        let mut publisher = f.publisher();

        let report = publisher.publish(&["c"], true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.versions.len(), 1);
        assert_eq!(f.tool.calls_starting_with("index"), vec!["index"]);

        assert_eq!(f.store.operation_counts().uploads, 0);
        assert_eq!(
            f.store.paths(),
            vec!["stable/index.yaml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failure_releases_lock() {
        let f = Fixture::new();
        f.tool.fail("package", "b");
        let mut publisher = f.publisher();

        let err = publisher.publish(&["a"], false).await.unwrap_err();
        assert!(matches!(err, RepoError::ToolFailed { .. }));

        // c was never processed and nothing was uploaded
        assert!(f.tool.calls().iter().all(|c| !c.ends_with(" c")));
        assert_eq!(f.store.operation_counts().uploads, 0);
        assert!(f.store.get("stable/index.yaml.lock").is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_earlier_charts_and_old_index() {
        let f = Fixture::new();
        f.store.fail_upload_number(2);
        let mut publisher = f.publisher();

        let err = publisher.publish(&["a"], false).await.unwrap_err();
        assert!(matches!(err, RepoError::Store { .. }));

        // Uploads stop at the failure and the index is left alone
        assert_eq!(f.store.operation_counts().uploads, 2);
        assert!(f.store.get("stable/a-1.1.0.tgz").is_some());
        assert!(f.store.get("stable/b-0.1.0.tgz").is_none());
        assert!(f.store.get("stable/c-2.0.0.tgz").is_none());
        let index = RepositoryIndex::from_bytes(&f.store.get("stable/index.yaml").unwrap()).unwrap();
        assert_eq!(index.latest_version("a"), Some(Version::new(1, 0, 0)));
        assert!(index.get("b").is_none());

        assert!(f.store.get("stable/index.yaml.lock").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_lock_times_out_before_any_work() {
        let f = Fixture::new();
        f.store.put("stable/index.yaml.lock", "another publisher");
        let mut publisher = f.publisher();

        let err = publisher.publish(&["a"], false).await.unwrap_err();
        assert!(err.is_lock_timeout());
        assert!(f.tool.calls().is_empty());
        assert_eq!(
            f.store.get("stable/index.yaml.lock").unwrap(),
            b"another publisher"
        );
    }

    #[tokio::test]
    async fn test_stale_lock_is_swept_before_publishing() {
        let f = Fixture::new();
        f.store.put("stable/index.yaml.lock", "crashed publisher");
        f.store
            .backdate("stable/index.yaml.lock", Duration::from_secs(2 * 3600));
        let mut publisher = f.publisher();

        publisher.publish(&["d"], false).await.unwrap();
        assert!(f.store.get("stable/index.yaml.lock").is_none());
    }

    #[tokio::test]
    async fn test_unknown_chart_fails_before_locking() {
        let f = Fixture::new();
        let mut publisher = f.publisher();

        let err = publisher.publish(&["missing"], false).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::Core(CoreError::UnknownChart { .. })
        ));
        assert_eq!(f.store.operation_counts().creates, 0);
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let f = Fixture::new();
        let store = MemoryStore::new();
        let mut config = Config {
            repositories: vec![crate::config::Repository::new("internal", "gs://fresh").unwrap()],
            ..Config::default()
        };
        config.publish.repository = Some("internal".to_string());
        let mut publisher = Publisher::new(
            SourceTree::load(f.charts()).unwrap(),
            Arc::new(store.clone()),
            Arc::new(f.tool.clone()),
            PublishTarget::from_config(&config).unwrap(),
        );

        let report = publisher.publish(&["a"], false).await.unwrap();
        assert_eq!(report.versions["a"], Version::new(1, 0, 0));
        assert!(store.get("index.yaml").is_some());
        assert!(store.get("a-1.0.0.tgz").is_some());
    }
}
