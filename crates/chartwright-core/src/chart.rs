//! Chart definition and loading

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Manifest file name inside every chart directory
pub const CHART_FILE: &str = "Chart.yaml";

/// Prefix marking a dependency that lives in a sibling source directory
pub const LOCAL_REPOSITORY_PREFIX: &str = "file://";

/// A Helm chart manifest (`Chart.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// API version (v1 or v2)
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Chart type
    #[serde(default)]
    pub r#type: ChartKind,

    /// Dependencies
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

/// Chart type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Application,
    Library,
}

/// Chart dependency as declared in `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    /// Dependency name
    pub name: String,

    /// Version constraint
    #[serde(default)]
    pub version: Option<String>,

    /// Repository URL, `file://` path or `@alias`
    #[serde(default)]
    pub repository: Option<String>,

    /// Runtime condition expression
    #[serde(default)]
    pub condition: Option<String>,

    /// Alias name
    #[serde(default)]
    pub alias: Option<String>,
}

impl ChartDependency {
    /// Whether this dependency is built from a sibling source directory
    #[inline]
    pub fn is_local(&self) -> bool {
        self.repository
            .as_deref()
            .is_some_and(|r| r.starts_with(LOCAL_REPOSITORY_PREFIX))
    }
}

impl Chart {
    /// Names of dependencies resolved from sibling source directories
    pub fn local_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(|d| d.is_local())
            .map(|d| d.name.as_str())
    }
}

/// Loaded chart with resolved paths
#[derive(Debug, Clone)]
pub struct LoadedChart {
    /// Chart definition
    pub chart: Chart,

    /// Root directory of the chart
    pub root: PathBuf,
}

impl LoadedChart {
    /// Load a chart from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.exists() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join(CHART_FILE);
        if !chart_file.exists() {
            return Err(CoreError::InvalidChart {
                message: format!("{} not found in {}", CHART_FILE, root.display()),
            });
        }

        let content = std::fs::read_to_string(&chart_file)?;
        let chart: Chart = serde_yaml::from_str(&content)?;

        if chart.api_version != "v1" && chart.api_version != "v2" {
            return Err(CoreError::InvalidChart {
                message: format!(
                    "Unsupported API version in {}: {}. Expected: v1 or v2",
                    chart_file.display(),
                    chart.api_version
                ),
            });
        }

        if chart.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: format!("Missing chart name in {}", chart_file.display()),
            });
        }

        Ok(Self { chart, root })
    }

    /// Path of the `Chart.yaml` file
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(CHART_FILE)
    }

    /// Get the chart name
    pub fn name(&self) -> &str {
        &self.chart.name
    }

    /// Get the manifest version
    pub fn version(&self) -> &Version {
        &self.chart.version
    }

    /// Rewrite the top-level `version:` line of `Chart.yaml`
    ///
    /// Everything else in the file, comments included, is left untouched.
    pub fn set_version(&mut self, version: &Version) -> Result<()> {
        let path = self.manifest_path();
        let content = std::fs::read_to_string(&path)?;
        let updated = replace_version_line(&content, version).ok_or_else(|| {
            CoreError::InvalidChart {
                message: format!("No top-level version field in {}", path.display()),
            }
        })?;
        std::fs::write(&path, updated)?;
        self.chart.version = version.clone();
        Ok(())
    }
}

/// Compute the version a chart is published at
///
/// The manifest version wins when it is ahead of everything published.
/// Otherwise the highest published version gets a minor bump.
pub fn next_version(manifest: &Version, published: Option<&Version>) -> Version {
    match published {
        Some(latest) if manifest <= latest => Version::new(latest.major, latest.minor + 1, 0),
        _ => manifest.clone(),
    }
}

fn replace_version_line(content: &str, version: &Version) -> Option<String> {
    let re = Regex::new(r#"(?m)^version:[ \t]*['"]?[^'"\s#]*['"]?"#).ok()?;
    if !re.is_match(content) {
        return None;
    }
    Some(
        re.replace(content, format!("version: {}", version).as_str())
            .into_owned(),
    )
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_chart(dir: &Path, yaml: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CHART_FILE), yaml).unwrap();
    }

    #[test]
    fn test_load_chart() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("web");
        write_chart(
            &dir,
            r#"
apiVersion: v2
name: web
version: 1.2.3
dependencies:
  - name: common
    version: "1.0.0"
    repository: file://../common
  - name: redis
    version: "17.0.0"
    repository: https://charts.bitnami.com/bitnami
"#,
        );

        let loaded = LoadedChart::load(&dir).unwrap();
        assert_eq!(loaded.name(), "web");
        assert_eq!(loaded.version(), &Version::new(1, 2, 3));
        assert_eq!(
            loaded.chart.local_dependencies().collect::<Vec<_>>(),
            vec!["common"]
        );
    }

    #[test]
    fn test_load_rejects_unknown_api_version() {
        let tmp = TempDir::new().unwrap();
        write_chart(tmp.path(), "apiVersion: v9\nname: web\nversion: 1.0.0\n");

        let err = LoadedChart::load(tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let err = LoadedChart::load(tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_load_invalid_version() {
        let tmp = TempDir::new().unwrap();
        write_chart(tmp.path(), "apiVersion: v2\nname: web\nversion: one\n");
        assert!(LoadedChart::load(tmp.path()).is_err());
    }

    #[test]
    fn test_next_version() {
        let v = |s: &str| Version::parse(s).unwrap();

        assert_eq!(next_version(&v("1.2.3"), None), v("1.2.3"));
        assert_eq!(next_version(&v("2.0.0"), Some(&v("1.4.2"))), v("2.0.0"));
        assert_eq!(next_version(&v("1.4.2"), Some(&v("1.4.2"))), v("1.5.0"));
        assert_eq!(next_version(&v("1.0.0"), Some(&v("1.4.2"))), v("1.5.0"));
        assert_eq!(
            next_version(&v("1.0.0"), Some(&v("1.4.2-rc.1"))),
            v("1.5.0")
        );
    }

    #[test]
    fn test_set_version_preserves_rest_of_file() {
        let tmp = TempDir::new().unwrap();
        let original = r#"# Web frontend
apiVersion: v2
name: web
version: "1.2.3" # bumped by publish
dependencies:
  - name: common
    version: 1.0.0
    repository: file://../common
"#;
        write_chart(tmp.path(), original);

        let mut loaded = LoadedChart::load(tmp.path()).unwrap();
        loaded.set_version(&Version::new(1, 3, 0)).unwrap();

        let content = std::fs::read_to_string(tmp.path().join(CHART_FILE)).unwrap();
        assert!(content.starts_with("# Web frontend\n"));
        assert!(content.contains("version: 1.3.0 # bumped by publish"));
        // Dependency versions are indented and must not change
        assert!(content.contains("    version: 1.0.0"));
        assert_eq!(loaded.version(), &Version::new(1, 3, 0));

        let reloaded = LoadedChart::load(tmp.path()).unwrap();
        assert_eq!(reloaded.version(), &Version::new(1, 3, 0));
    }
}
