//! Chartwright CLI - publish dependency-linked Helm charts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use chartwright_repo::ResolveMode;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "chartwright")]
#[command(author = "Chartwright Contributors")]
#[command(version)]
#[command(about = "Publish dependency-linked Helm charts to a shared repository", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/chartwright/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chart source directory (overrides chartsDir from the config)
    #[arg(long, global = true)]
    charts_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish charts, and every chart depending on them
    Publish {
        /// Charts to publish
        #[arg(required = true)]
        charts: Vec<String>,

        /// Do everything up to the merged index, but upload nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Print charts in dependency order, one per line
    Order {
        /// Charts to order (default: all)
        charts: Vec<String>,

        /// Include every chart that depends on the given ones
        #[arg(long)]
        with_dependents: bool,
    },

    /// Print the directory to use for a chart release
    Resolve {
        /// Chart name
        name: String,

        /// Exact chart version
        #[arg(value_name = "VERSION")]
        chart_version: String,

        /// Repository name (default: the publish repository)
        #[arg(long)]
        repo: Option<String>,

        /// development: source first; deploy: published artifact first
        #[arg(long, default_value_t = ResolveMode::Development)]
        mode: ResolveMode,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("chartwright=warn"),
        1 => EnvFilter::new("chartwright=info"),
        _ => EnvFilter::new("chartwright=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let global = commands::Global {
        config: cli.config,
        charts_dir: cli.charts_dir,
    };

    let result = match cli.command {
        Commands::Publish { charts, dry_run } => {
            commands::publish::run(&global, &charts, dry_run).await
        }
        Commands::Order {
            charts,
            with_dependents,
        } => commands::order::run(&global, &charts, with_dependents),
        Commands::Resolve {
            name,
            chart_version,
            repo,
            mode,
        } => commands::resolve::run(&global, &name, &chart_version, repo.as_deref(), mode).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code)
        }
    }
}
