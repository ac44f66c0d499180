//! Publish command

use console::style;
use std::sync::Arc;

use chartwright_repo::{GcsStore, HelmCli, PublishTarget, Publisher};

use super::Global;
use crate::error::{CliError, Result};

pub async fn run(global: &Global, charts: &[String], dry_run: bool) -> Result<()> {
    let config = global.load_config()?;
    if config.publish.repository.is_none() {
        return Err(CliError::config_with_help(
            "no publish repository configured",
            "set publish.repository to the name of a gs:// repository",
        ));
    }

    let target = PublishTarget::from_config(&config)?;
    let store = Arc::new(GcsStore::new(target.bucket.clone())?);
    let source = global.load_source(&config)?;

    let mut publisher = Publisher::new(source, store, Arc::new(HelmCli::new()), target);
    let report = publisher.publish(charts, dry_run).await?;

    for (name, version) in &report.versions {
        println!("{} {}", style(name).bold(), style(version).green());
    }
    if report.dry_run {
        println!(
            "{} {} object(s) not uploaded",
            style("Dry run:").yellow().bold(),
            report.objects.len()
        );
    }
    Ok(())
}
