mod config;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{Backend, Overrides, RunConfig};

#[derive(Parser)]
#[command(
    name = "ipcq",
    about = "Push actions from many threads and drain them on one event loop",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a producer/loop session and print a JSON report
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Event loop that drains the queue
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Number of producer threads
    #[arg(long)]
    producers: Option<usize>,

    /// Actions pushed by each producer
    #[arg(long)]
    actions: Option<usize>,

    /// Max random pause between pushes, in microseconds
    #[arg(long)]
    jitter_us: Option<u64>,

    /// How long to wait for the loop to drain, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// JSON run config; flags given here override it
    #[arg(long, env = "IPCQ_CONFIG")]
    config: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend,
            producers: self.producers,
            actions: self.actions,
            jitter_us: self.jitter_us,
            timeout_ms: self.timeout_ms,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run(&args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the session passed its checks.
fn run(args: &RunArgs) -> Result<bool> {
    let base = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let config = base.apply(args.overrides());
    config.validate()?;

    let report = session::run(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.ok() {
        tracing::error!(
            lost = report.lost,
            duplicated = report.duplicated,
            off_loop_thread = report.off_loop_thread,
            timed_out = report.timed_out,
            "session failed its checks"
        );
    }
    Ok(report.ok())
}
