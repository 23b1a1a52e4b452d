pub mod backup;
pub mod inspect;
pub mod plan;
pub mod run;
pub mod runs;
pub mod stats;
pub mod validate;

use crate::cli::args::*;
use recap_core::config::{LoadedConfig, TrackingConfig};
use std::path::{Path, PathBuf};

pub use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Validate(args) => validate::run(args),
        Command::Plan(args) => plan::run(args),
        Command::Runs(args) => runs::run(args),
        Command::Inspect(args) => inspect::run(args),
        Command::Stats(args) => stats::run(args),
        Command::Backup(args) => backup::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Tracking directory: `--tracking-dir` / `RECAP_TRACKING_DIR`, then the
/// config's `tracking.dir` (relative to the config file), then `.recap`.
pub(crate) fn tracking_dir(args: &TrackingDirArgs, loaded: Option<&LoadedConfig>) -> PathBuf {
    if let Some(dir) = &args.tracking_dir {
        return dir.clone();
    }
    match loaded {
        Some(l) => l.resolve(&l.config.tracking.dir),
        None => TrackingConfig::default().dir,
    }
}

/// Tracker for read-only commands. A missing directory means nothing has
/// been tracked yet, which is not an error.
pub(crate) fn open_existing_tracker(dir: &Path) -> anyhow::Result<Option<recap_core::tracking::Tracker>> {
    if !dir.join(recap_core::tracking::DB_FILE).exists() {
        return Ok(None);
    }
    Ok(Some(recap_core::tracking::Tracker::open(dir)?))
}
