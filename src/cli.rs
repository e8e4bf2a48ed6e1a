use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "auditbox")]
#[command(about = "Distributed code-audit worker", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $AUDITBOX_CONFIG or config/auditbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the task queue and run the worker pool
    Worker(WorkerArgs),
    /// Add an audit task to the queue
    Enqueue(EnqueueArgs),
}

#[derive(clap::Args, Debug)]
pub struct WorkerArgs {
    /// Override the health/metrics bind address
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct EnqueueArgs {
    /// URL of the zip archive to audit
    pub url: String,

    #[arg(long, default_value = "")]
    pub title: String,

    /// Audit kind to run; repeat for several
    #[arg(long = "audit")]
    pub audits: Vec<String>,
}
