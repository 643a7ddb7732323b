use crate::config::DEFAULT_CLUSTER_FILE;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clusterup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile Azure cluster infrastructure from a cluster file", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the cloud to the cluster file
    Update(UpdateArgs),

    /// Show what `update` would change, without changing anything
    Preview(PreviewArgs),

    /// List tasks in dependency order
    Tasks(TasksArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster file (TOML or JSON)
    #[arg(short = 'f', long = "file", default_value = DEFAULT_CLUSTER_FILE)]
    pub file: PathBuf,

    /// State file of the simulated control plane
    #[arg(long, env = "CLUSTERUP_STATE")]
    pub state: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Maximum tasks applying at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Resolve and validate only
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Print the plan and report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TasksArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}
