use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod common;
pub use common::*;

#[derive(Parser)]
#[command(
    name = "recap",
    version,
    about = "Masked caption reconstruction experiments: mask, reconstruct, score, track"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every strategy × masking plan of a batch config
    Run(RunArgs),
    /// Check a batch config without running it
    Validate(ValidateArgs),
    /// List the child runs a batch config expands into
    Plan(PlanArgs),
    /// Show tracked runs grouped by batch
    Runs(RunsArgs),
    /// Show the reconstructions of a run
    Inspect(InspectArgs),
    /// Dataset statistics for the config's data source
    Stats(StatsArgs),
    /// Copy a file or archive a directory to a backup location
    Backup(BackupArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub config: PathBuf,

    /// System config underneath the batch config (batch keys win)
    #[arg(long)]
    pub system_config: Option<PathBuf>,

    #[command(flatten)]
    pub tracking: TrackingDirArgs,

    /// Run even if `require_clean_git` is set and the working tree is dirty
    #[arg(long)]
    pub allow_dirty: bool,

    /// Ignore cached completions and embeddings
    #[arg(long)]
    pub refresh_cache: bool,

    /// Also write the batch summary JSON here
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// No per-run progress lines
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub system_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
pub struct PlanArgs {
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub system_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
pub struct RunsArgs {
    #[command(flatten)]
    pub tracking: TrackingDirArgs,

    /// Only runs of this experiment
    #[arg(long)]
    pub experiment: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
pub struct InspectArgs {
    /// Child run id, or a unique prefix such as the short id `recap runs` prints
    #[arg(long)]
    pub run: String,

    #[arg(long, conflicts_with = "index")]
    pub video: Option<String>,

    /// Position of the video in the run (0-based)
    #[arg(long)]
    pub index: Option<usize>,

    #[command(flatten)]
    pub tracking: TrackingDirArgs,
}

#[derive(Parser, Clone, Debug)]
pub struct StatsArgs {
    #[arg(long)]
    pub config: PathBuf,

    /// System config underneath the batch config (batch keys win)
    #[arg(long)]
    pub system_config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
#[command(group(
    clap::ArgGroup::new("source").required(true).args(["file", "dir"])
))]
pub struct BackupArgs {
    #[arg(long)]
    pub dest: PathBuf,

    #[arg(long)]
    pub file: Option<PathBuf>,

    #[arg(long, requires = "prefix")]
    pub dir: Option<PathBuf>,

    /// Archive name prefix for --dir
    #[arg(long)]
    pub prefix: Option<String>,
}
