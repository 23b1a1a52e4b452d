//! Argument types shared across commands.

use clap::ValueEnum;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct TrackingDirArgs {
    /// Tracking directory (default: the config's `tracking.dir`, else .recap)
    #[arg(long, env = "RECAP_TRACKING_DIR")]
    pub tracking_dir: Option<PathBuf>,
}
