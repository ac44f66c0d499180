//! Local chart dependency graph
//!
//! Only `file://` dependencies between charts of the same source tree become
//! edges. The graph is used to order publishing so that a chart is always
//! packaged after the charts it vendors.
//!
//! Nodes live in a name-keyed table and reference each other by name, which
//! keeps the bidirectional links free of ownership cycles.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{CoreError, Result};
use crate::source::SourceTree;

/// A chart and its local edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartNode {
    /// Chart name
    pub name: String,
    /// Charts this chart depends on
    pub dependencies: Vec<String>,
    /// Charts that depend on this chart
    pub dependents: Vec<String>,
}

impl ChartNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// Acyclic graph of local chart dependencies with precomputed topological ranks
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, ChartNode>,
    rank: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph for `chart_names`, asking `lookup` for each chart's
    /// declared local dependencies
    ///
    /// References to charts outside `chart_names` are dropped with a warning.
    /// Fails with [`CoreError::Cycle`] when the dependencies loop.
    pub fn new<I, S, F>(chart_names: I, mut lookup: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&str) -> Vec<String>,
    {
        let mut names: Vec<String> = chart_names
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        names.sort();
        names.dedup();

        let mut nodes: HashMap<String, ChartNode> = names
            .iter()
            .map(|n| (n.clone(), ChartNode::new(n)))
            .collect();

        for name in &names {
            for dep in lookup(name) {
                if !nodes.contains_key(&dep) {
                    tracing::warn!(
                        "Chart '{}' depends on '{}' which is not a local chart, ignoring",
                        name,
                        dep
                    );
                    continue;
                }

                let Some(node) = nodes.get_mut(name) else {
                    continue;
                };
                if node.dependencies.contains(&dep) {
                    continue;
                }
                node.dependencies.push(dep.clone());

                if let Some(target) = nodes.get_mut(&dep) {
                    target.dependents.push(name.clone());
                }
            }
        }

        let mut graph = Self {
            nodes,
            rank: HashMap::new(),
        };
        graph.check_cycles(&names)?;
        graph.rank = graph.compute_ranks();
        Ok(graph)
    }

    /// Build the graph from every chart in a source tree
    pub fn from_source(source: &SourceTree) -> Result<Self> {
        Self::new(source.names(), |name| source.local_dependencies(name))
    }

    /// Get a node by name
    pub fn get(&self, name: &str) -> Option<&ChartNode> {
        self.nodes.get(name)
    }

    /// Check if a chart is part of the graph
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Direct local dependencies of a chart
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Direct dependents of a chart
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or_default()
    }

    /// Topological rank of a chart; dependencies always rank lower
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.rank.get(name).copied()
    }

    /// All chart names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of charts
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Order a subset of charts so every chart follows its dependencies
    ///
    /// Charts of equal rank come out in no particular order. Duplicates are
    /// removed.
    pub fn topo_sort<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            let rank = self.rank(name).ok_or_else(|| CoreError::UnknownChart {
                name: name.to_string(),
            })?;
            if seen.insert(name) {
                ordered.push((rank, name.to_string()));
            }
        }

        ordered.sort_unstable_by_key(|(rank, _)| *rank);
        Ok(ordered.into_iter().map(|(_, name)| name).collect())
    }

    /// The seed charts plus every chart that transitively depends on one of them
    pub fn with_dependents<S: AsRef<str>>(&self, seed: &[S]) -> Result<BTreeSet<String>> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for name in seed {
            let name = name.as_ref();
            let node = self.nodes.get(name).ok_or_else(|| CoreError::UnknownChart {
                name: name.to_string(),
            })?;
            if visited.insert(node.name.clone()) {
                queue.push_back(&node.name);
            }
        }

        while let Some(name) = queue.pop_front() {
            for dependent in self.dependents_of(name) {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        Ok(visited)
    }

    /// Everything that must be republished when `changed` charts change, in a
    /// safe publishing order
    pub fn publish_order<S: AsRef<str>>(&self, changed: &[S]) -> Result<Vec<String>> {
        let affected: Vec<String> = self.with_dependents(changed)?.into_iter().collect();
        self.topo_sort(&affected)
    }

    /// Depth-first search keeping the active path, failing on the first back edge
    fn check_cycles(&self, names: &[String]) -> Result<()> {
        let mut done: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();

        fn visit<'a>(
            name: &'a str,
            graph: &'a DependencyGraph,
            done: &mut HashSet<&'a str>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if let Some(pos) = path.iter().position(|n| *n == name) {
                let mut cycle: Vec<&str> = path[pos..].to_vec();
                cycle.push(name);
                return Err(CoreError::Cycle {
                    cycle: cycle.join(" → "),
                });
            }

            path.push(name);
            for dep in graph.dependencies_of(name) {
                visit(dep, graph, done, path)?;
            }
            path.pop();
            done.insert(name);
            Ok(())
        }

        for name in names {
            visit(name, self, &mut done, &mut path)?;
        }
        Ok(())
    }

    /// Kahn's algorithm: each round removes every chart whose dependencies are
    /// all gone, and the round number becomes the rank
    fn compute_ranks(&self) -> HashMap<String, usize> {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|n| (n.name.as_str(), n.dependencies.len()))
            .collect();
        let mut rank = HashMap::with_capacity(self.nodes.len());

        let mut current: Vec<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut round = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for name in current {
                rank.insert(name.to_string(), round);
                for dependent in self.dependents_of(name) {
                    if let Some(degree) = remaining.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }
            current = next;
            round += 1;
        }

        rank
    }
}
