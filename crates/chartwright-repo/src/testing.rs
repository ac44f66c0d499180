//! Scripted chart tool for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use chartwright_core::LoadedChart;

use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, RepositoryIndex};
use crate::tool::ChartTool;

#[derive(Default)]
struct Script {
    calls: Vec<String>,
    fetch_gates: HashMap<String, Arc<Notify>>,
    failing: HashSet<String>,
    extra_entries: HashSet<String>,
}

/// Records every call and fakes helm's filesystem effects
#[derive(Clone, Default)]
pub(crate) struct FakeTool {
    script: Arc<Mutex<Script>>,
}

impl FakeTool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Calls in order, e.g. `fetch web@1.0.0` or `package web`
    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn calls_starting_with(&self, verb: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(verb))
            .collect()
    }

    /// Hold fetches of `name` until the returned handle is notified
    pub(crate) fn gate_fetch(&self, name: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock()
            .fetch_gates
            .insert(name.to_string(), gate.clone());
        gate
    }

    /// Make `verb` fail for chart `name`, e.g. `fail("package", "web")`
    pub(crate) fn fail(&self, verb: &str, name: &str) {
        self.lock().failing.insert(format!("{} {}", verb, name));
    }

    /// Make fetches of `name` unpack a second top-level entry
    pub(crate) fn unpack_extra_entry(&self, name: &str) {
        self.lock().extra_entries.insert(name.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, verb: &str, name: &str, detail: &str) -> Result<()> {
        let mut script = self.lock();
        let call = format!("{} {}{}", verb, name, detail);
        script.calls.push(call.trim_end().to_string());
        if script.failing.contains(&format!("{} {}", verb, name)) {
            return Err(RepoError::ToolFailed {
                command: format!("helm {} {}", verb, name),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

fn chart_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ChartTool for FakeTool {
    async fn fetch(&self, repo_url: &str, name: &str, version: &str, dest_dir: &Path) -> Result<()> {
        let gate = self.lock().fetch_gates.get(name).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.record("fetch", name, &format!("@{} from {}", version, repo_url))?;

        let chart_dir = dest_dir.join(name);
        std::fs::create_dir_all(&chart_dir)?;
        std::fs::write(
            chart_dir.join("Chart.yaml"),
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        )?;
        if self.lock().extra_entries.contains(name) {
            std::fs::create_dir_all(dest_dir.join(format!("{}-extra", name)))?;
        }
        Ok(())
    }

    async fn dependency_build(&self, chart_dir: &Path) -> Result<()> {
        self.record("build", &chart_name(chart_dir), "")?;
        std::fs::create_dir_all(chart_dir.join("charts"))?;
        Ok(())
    }

    async fn package(&self, chart_dir: &Path, dest_dir: &Path) -> Result<()> {
        let chart = LoadedChart::load(chart_dir)?;
        self.record("package", chart.name(), &format!("@{}", chart.version()))?;
        let manifest = std::fs::read(chart.manifest_path())?;
        std::fs::write(
            dest_dir.join(format!("{}-{}.tgz", chart.name(), chart.version())),
            manifest,
        )?;
        Ok(())
    }

    async fn index_merge(&self, charts_dir: &Path, url: &str, previous_index: Option<&Path>) -> Result<()> {
        self.record("index", "", "")?;
        let mut index = match previous_index {
            Some(path) => RepositoryIndex::load(path)?,
            None => RepositoryIndex::default(),
        };

        let mut archives: Vec<PathBuf> = std::fs::read_dir(charts_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "tgz"))
            .collect();
        archives.sort();

        for archive in archives {
            let chart = serde_yaml::from_slice::<chartwright_core::Chart>(&std::fs::read(&archive)?)?;
            let file = chart_name(&archive);
            index.add_entry(ChartEntry {
                name: chart.name,
                version: chart.version.to_string(),
                urls: vec![format!("{}/{}", url, file)],
                ..ChartEntry::default()
            });
        }

        std::fs::write(charts_dir.join("index.yaml"), serde_yaml::to_string(&index)?)?;
        Ok(())
    }

    async fn generate_docs(&self, chart_dir: &Path) -> Result<()> {
        let name = chart_name(chart_dir);
        self.record("docs", &name, "")?;
        std::fs::write(chart_dir.join("README.md"), format!("# {}\n", name))?;
        Ok(())
    }
}

/// Write `<root>/<name>/Chart.yaml` with local dependencies on `deps`
pub(crate) fn write_chart(root: &Path, name: &str, version: &str, deps: &[&str]) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let mut manifest = format!(
        "apiVersion: v2\nname: {}\n# bumped on publish\nversion: {}\n",
        name, version
    );
    if !deps.is_empty() {
        manifest.push_str("dependencies:\n");
        for dep in deps {
            manifest.push_str(&format!(
                "  - name: {}\n    version: \">=0.0.0\"\n    repository: file://../{}\n",
                dep, dep
            ));
        }
    }
    std::fs::write(dir.join("Chart.yaml"), manifest).unwrap();
}
