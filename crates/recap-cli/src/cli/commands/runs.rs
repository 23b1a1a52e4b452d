use recap_core::tracking::{build_hierarchy, RunTree};

use crate::cli::args::{OutputFormat, RunsArgs};
use crate::cli::commands::{exit_codes, open_existing_tracker, tracking_dir};

pub fn run(args: RunsArgs) -> anyhow::Result<i32> {
    let dir = tracking_dir(&args.tracking, None);
    let tree = match open_existing_tracker(&dir)? {
        Some(tracker) => build_hierarchy(tracker.store(), args.experiment.as_deref())?,
        None => RunTree::default(),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
        OutputFormat::Text => print!("{}", tree),
    }
    Ok(exit_codes::SUCCESS)
}
