//! Chartwright Core - chart manifests and local dependency ordering
//!
//! This crate provides the pure, synchronous pieces of Chartwright:
//! - `LoadedChart`: a chart directory and its `Chart.yaml`
//! - `SourceTree`: every chart under a source directory
//! - `DependencyGraph`: local chart-to-chart dependencies with topological order
//! - `next_version`: the minor-bump heuristic applied on publish

pub mod chart;
pub mod error;
pub mod graph;
pub mod source;

pub use chart::{Chart, ChartDependency, ChartKind, LoadedChart, next_version};
pub use error::{CoreError, Result};
pub use graph::{ChartNode, DependencyGraph};
pub use source::SourceTree;
