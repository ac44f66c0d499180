//! Order command - print charts in dependency order

use chartwright_core::DependencyGraph;

use super::Global;
use crate::error::Result;

pub fn run(global: &Global, charts: &[String], with_dependents: bool) -> Result<()> {
    let config = global.load_config()?;
    let source = global.load_source(&config)?;
    let graph = DependencyGraph::from_source(&source)?;

    let requested: Vec<String> = if charts.is_empty() {
        graph.names().into_iter().map(String::from).collect()
    } else {
        charts.to_vec()
    };

    let order = if with_dependents {
        graph.publish_order(&requested)?
    } else {
        graph.topo_sort(&requested)?
    };

    for name in order {
        println!("{}", name);
    }
    Ok(())
}
