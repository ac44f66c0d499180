//! Chart source tree
//!
//! A source tree is a directory whose immediate subdirectories are charts:
//!
//! ```text
//! charts/
//! ├── common/Chart.yaml
//! ├── web/Chart.yaml      # depends on file://../common
//! └── worker/Chart.yaml
//! ```

use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::chart::{CHART_FILE, LoadedChart};
use crate::error::{CoreError, Result};

/// All charts found under a source directory, keyed by chart name
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    root: PathBuf,
    charts: BTreeMap<String, LoadedChart>,
}

impl SourceTree {
    /// Scan `root` for `<dir>/Chart.yaml`
    ///
    /// A missing root yields an empty tree. Two directories declaring the same
    /// chart name are rejected.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut charts: BTreeMap<String, LoadedChart> = BTreeMap::new();

        if !root.exists() {
            tracing::debug!("Chart source directory {} does not exist", root.display());
            return Ok(Self { root, charts });
        }

        for entry in walkdir::WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !path.is_dir() || !path.join(CHART_FILE).try_exists()? {
                continue;
            }

            let loaded = LoadedChart::load(path)?;
            let name = loaded.name().to_string();

            if let Some(existing) = charts.get(&name) {
                return Err(CoreError::DuplicateChart {
                    name,
                    first: existing.root.display().to_string(),
                    second: loaded.root.display().to_string(),
                });
            }

            charts.insert(name, loaded);
        }

        tracing::debug!("Loaded {} chart(s) from {}", charts.len(), root.display());
        Ok(Self { root, charts })
    }

    /// Source directory this tree was loaded from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a chart by name
    pub fn get(&self, name: &str) -> Option<&LoadedChart> {
        self.charts.get(name)
    }

    /// Get a mutable chart by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut LoadedChart> {
        self.charts.get_mut(name)
    }

    /// Check if a chart exists in source
    pub fn contains(&self, name: &str) -> bool {
        self.charts.contains_key(name)
    }

    /// On-disk path of a chart
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.charts.get(name).map(|c| c.root.as_path())
    }

    /// Manifest version of a chart
    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.charts.get(name).map(|c| c.version())
    }

    /// Declared local dependency names of a chart
    pub fn local_dependencies(&self, name: &str) -> Vec<String> {
        self.charts
            .get(name)
            .map(|c| c.chart.local_dependencies().map(String::from).collect())
            .unwrap_or_default()
    }

    /// All chart names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.charts.keys().map(|s| s.as_str()).collect()
    }

    /// Number of charts
    pub fn len(&self) -> usize {
        self.charts.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}
